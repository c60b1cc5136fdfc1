//! The single storage boundary crossing.
//!
//! Every statement the facade issues goes through [`run`], which times it, logs
//! it and classifies any raw storage failure.

use std::time::Instant;

use asupersync::{Cx, Outcome};
use sqlentity_core::{Error, Executor, Operation, QueryResult, classify};
use sqlentity_query::Statement;

use crate::config::OrmConfig;

/// What a statement acts on, for error classification and logs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub operation: Operation,
    pub entity: &'a str,
    pub table: &'a str,
}

impl<'a> Target<'a> {
    pub(crate) fn new(operation: Operation, entity: &'a str, table: &'a str) -> Self {
        Self {
            operation,
            entity,
            table,
        }
    }
}

pub(crate) async fn run<E: Executor + ?Sized>(
    cx: &Cx,
    db: &E,
    config: &OrmConfig,
    statement: &Statement,
    target: Target<'_>,
) -> Outcome<QueryResult, Error> {
    if config.log_parameters {
        tracing::trace!(sql = %statement.sql, params = ?statement.params, "Executing statement");
    }
    let started = Instant::now();
    let outcome = statement.execute(cx, db).await;
    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;

    match outcome {
        Outcome::Ok(result) => {
            tracing::debug!(
                operation = %target.operation,
                entity = target.entity,
                sql = %statement.sql,
                params = statement.params.len(),
                rows = result.rows.len(),
                elapsed_ms,
                "Executed statement"
            );
            if elapsed >= config.slow_query_threshold {
                tracing::warn!(
                    operation = %target.operation,
                    entity = target.entity,
                    sql = %statement.sql,
                    elapsed_ms,
                    "Slow statement"
                );
            }
            Outcome::Ok(result)
        }
        Outcome::Err(raw) => {
            let err = classify(&raw, target.operation, target.entity, target.table);
            tracing::debug!(
                operation = %target.operation,
                entity = target.entity,
                sql = %statement.sql,
                kind = %err.kind(),
                code = raw.code.as_deref().unwrap_or(""),
                elapsed_ms,
                "Statement failed"
            );
            Outcome::Err(err)
        }
        Outcome::Cancelled(r) => Outcome::Cancelled(r),
        Outcome::Panicked(p) => Outcome::Panicked(p),
    }
}
