//! Atomic composition of several statements.

use std::future::Future;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlentity_core::{
    Connection, Error, ErrorKind, Executor, Operation, QueryResult, StorageError, TransactionOps, Value,
    classify,
};

/// Executor handed to a [`transaction`] callback.
///
/// Every statement issued through it runs on the transaction's session.
/// Clones share that session.
#[derive(Debug)]
pub struct TxScope<T> {
    tx: Arc<T>,
}

impl<T> Clone for TxScope<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: TransactionOps> Executor for TxScope<T> {
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<QueryResult, StorageError>> + Send {
        self.tx.query(cx, sql, params)
    }
}

fn classify_tx(raw: &StorageError, step: &str) -> Error {
    let err = classify(raw, Operation::Transaction, "transaction", "");
    tracing::warn!(step, kind = %err.kind(), error = %err, "Transaction step failed");
    err
}

/// Run `f` inside one transaction.
///
/// The transaction commits when `f` returns `Outcome::Ok` and rolls back on any
/// other outcome; the callback's outcome is returned unchanged. Transactions are
/// never nested implicitly: `f` receives a plain executor, not a connection.
#[tracing::instrument(level = "debug", skip(cx, conn, f))]
pub async fn transaction<'c, C, F, Fut, T>(cx: &Cx, conn: &'c C, f: F) -> Outcome<T, Error>
where
    C: Connection,
    F: FnOnce(TxScope<C::Tx<'c>>) -> Fut,
    Fut: Future<Output = Outcome<T, Error>>,
{
    let tx = match conn.begin(cx).await {
        Outcome::Ok(tx) => tx,
        Outcome::Err(raw) => return Outcome::Err(classify_tx(&raw, "begin")),
        Outcome::Cancelled(r) => return Outcome::Cancelled(r),
        Outcome::Panicked(p) => return Outcome::Panicked(p),
    };
    tracing::debug!("Transaction started");

    let scope = TxScope { tx: Arc::new(tx) };
    let handle = Arc::clone(&scope.tx);
    let outcome = f(scope).await;

    let Ok(tx) = Arc::try_unwrap(handle) else {
        return Outcome::Err(Error::new(
            ErrorKind::Configuration,
            "transaction scope escaped its callback; the transaction was not finished",
        ));
    };

    match outcome {
        Outcome::Ok(value) => match tx.commit(cx).await {
            Outcome::Ok(()) => {
                tracing::debug!("Transaction committed");
                Outcome::Ok(value)
            }
            Outcome::Err(raw) => Outcome::Err(classify_tx(&raw, "commit")),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        },
        other => {
            let rollback_error = match tx.rollback(cx).await {
                Outcome::Ok(()) => {
                    tracing::debug!("Transaction rolled back");
                    None
                }
                Outcome::Err(raw) => Some(classify_tx(&raw, "rollback").to_string()),
                Outcome::Cancelled(_) | Outcome::Panicked(_) => {
                    tracing::warn!("Rollback did not complete");
                    Some("rollback did not complete".to_string())
                }
            };
            match (other, rollback_error) {
                (Outcome::Err(mut err), Some(rollback)) => {
                    err.details_mut().rollback_error = Some(rollback);
                    Outcome::Err(err)
                }
                (other, _) => other,
            }
        }
    }
}
