//! Storage client contract.
//!
//! The ORM does not speak any wire protocol. Applications inject a storage
//! client implementing [`Connection`]; it receives SQL with positional `$n`
//! placeholders plus bound parameters and reports failures as raw
//! [`StorageError`]s, which the façade classifies before they reach callers.

use std::future::Future;
use std::sync::Arc;

use asupersync::{Cx, Outcome};

use crate::error::StorageError;
use crate::row::QueryResult;
use crate::value::Value;

/// Anything that can run a parameterized statement.
pub trait Executor: Send + Sync {
    /// Execute `sql` with `params` bound to `$1..$n`.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<QueryResult, StorageError>> + Send;
}

/// A pooled client (or single session) that can open transactions.
pub trait Connection: Executor {
    /// Transaction handle bound to one storage session.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Begin a transaction on a dedicated session.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, StorageError>> + Send;
}

/// An open transaction. Dropping it without commit is the client's business;
/// the façade always ends a transaction explicitly.
pub trait TransactionOps: Executor + Sized {
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), StorageError>> + Send;

    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), StorageError>> + Send;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<QueryResult, StorageError>> + Send {
        (**self).query(cx, sql, params)
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<QueryResult, StorageError>> + Send {
        (**self).query(cx, sql, params)
    }
}
