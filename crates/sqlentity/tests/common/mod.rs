//! Scripted in-memory storage client for facade tests.
//!
//! Every statement is recorded; results are replayed from a queue in order.
//! An empty queue answers with zero rows.

#![allow(dead_code)]
#![allow(clippy::manual_async_fn)]

use std::collections::VecDeque;
use std::future::{Future, ready};
use std::sync::{Arc, Mutex, PoisonError};

use asupersync::runtime::RuntimeBuilder;
use sqlentity::prelude::*;
use sqlentity::{QueryResult, Row};

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug)]
enum Scripted {
    Rows(Vec<Row>),
    Error(StorageError),
}

#[derive(Debug, Default)]
struct State {
    log: Vec<Recorded>,
    events: Vec<String>,
    script: VecDeque<Scripted>,
    rollback_failure: Option<StorageError>,
}

#[derive(Debug, Clone, Default)]
pub struct MockDb {
    state: Arc<Mutex<State>>,
}

impl MockDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Queue the result of the next statement.
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.with_state(|s| s.script.push_back(Scripted::Rows(rows)));
    }

    /// Queue a failure for the next statement.
    pub fn push_error(&self, err: StorageError) {
        self.with_state(|s| s.script.push_back(Scripted::Error(err)));
    }

    /// Make the next ROLLBACK fail with `err`.
    pub fn fail_rollback(&self, err: StorageError) {
        self.with_state(|s| s.rollback_failure = Some(err));
    }

    pub fn statements(&self) -> Vec<Recorded> {
        self.with_state(|s| s.log.clone())
    }

    pub fn sql(&self) -> Vec<String> {
        self.with_state(|s| s.log.iter().map(|r| r.sql.clone()).collect())
    }

    pub fn query_count(&self) -> usize {
        self.with_state(|s| s.log.len())
    }

    /// BEGIN / COMMIT / ROLLBACK markers, in order.
    pub fn events(&self) -> Vec<String> {
        self.with_state(|s| s.events.clone())
    }

    pub fn pending(&self) -> usize {
        self.with_state(|s| s.script.len())
    }

    fn answer(&self, sql: &str, params: &[Value]) -> Outcome<QueryResult, StorageError> {
        self.with_state(|s| {
            s.log.push(Recorded {
                sql: sql.to_string(),
                params: params.to_vec(),
            });
            match s.script.pop_front() {
                Some(Scripted::Rows(rows)) => Outcome::Ok(QueryResult::from_rows(rows)),
                Some(Scripted::Error(err)) => Outcome::Err(err),
                None => Outcome::Ok(QueryResult::from_rows(Vec::new())),
            }
        })
    }

    fn event(&self, name: &str) {
        self.with_state(|s| s.events.push(name.to_string()));
    }
}

impl Executor for MockDb {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<QueryResult, StorageError>> + Send {
        ready(self.answer(sql, params))
    }
}

impl Connection for MockDb {
    type Tx<'conn>
        = MockTx
    where
        Self: 'conn;

    fn begin(&self, _cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, StorageError>> + Send {
        self.event("BEGIN");
        ready(Outcome::Ok(MockTx { db: self.clone() }))
    }
}

#[derive(Debug)]
pub struct MockTx {
    db: MockDb,
}

impl Executor for MockTx {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<QueryResult, StorageError>> + Send {
        ready(self.db.answer(sql, params))
    }
}

impl TransactionOps for MockTx {
    fn commit(self, _cx: &Cx) -> impl Future<Output = Outcome<(), StorageError>> + Send {
        self.db.event("COMMIT");
        ready(Outcome::Ok(()))
    }

    fn rollback(self, _cx: &Cx) -> impl Future<Output = Outcome<(), StorageError>> + Send {
        self.db.event("ROLLBACK");
        match self.db.with_state(|s| s.rollback_failure.take()) {
            Some(err) => ready(Outcome::Err(err)),
            None => ready(Outcome::Ok(())),
        }
    }
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    Row::from_pairs(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())))
}

pub fn data(pairs: &[(&str, Value)]) -> Data {
    pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> std::result::Result<T, String> {
    match outcome {
        Outcome::Ok(v) => Ok(v),
        Outcome::Err(e) => Err(format!("unexpected error: {e}")),
        Outcome::Cancelled(r) => Err(format!("cancelled: {r:?}")),
        Outcome::Panicked(p) => Err(format!("panicked: {p:?}")),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

pub fn block_on<F: Future>(future: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(future)
}

/// Meter / Site / Reading / Tag / Team / Owner fixture.
pub fn registry() -> Registry {
    Registry::builder()
        .register(
            EntityDecl::new("Meter")
                .table("meters")
                .primary_key("id")
                .timestamps(true)
                .field(FieldDecl::typed("id", LogicalType::Number).column("meter_id"))
                .field(FieldDecl::new("name").required(true))
                .field(FieldDecl::new("type"))
                .field(FieldDecl::new("status"))
                .field(FieldDecl::typed("site_id", LogicalType::Number))
                .relationship(RelationshipDecl::belongs_to("site", "Site"))
                .relationship(
                    RelationshipDecl::has_many("readings", "Reading").order_by(OrderBy::asc("taken_at")),
                )
                .relationship(RelationshipDecl::many_to_many("tags", "Tag", "meter_tags")),
        )
        .register(
            EntityDecl::new("Site")
                .table("sites")
                .primary_key("id")
                .field(FieldDecl::typed("id", LogicalType::Number).column("site_id"))
                .field(FieldDecl::new("name"))
                .field(FieldDecl::typed("team_id", LogicalType::Number))
                .relationship(RelationshipDecl::belongs_to("team", "Team"))
                .relationship(RelationshipDecl::has_many("meters", "Meter")),
        )
        .register(
            EntityDecl::new("Reading")
                .table("readings")
                .primary_key("id")
                .field(FieldDecl::typed("meter_id", LogicalType::Number))
                .field(FieldDecl::typed("value", LogicalType::Number))
                .field(FieldDecl::typed("taken_at", LogicalType::Date)),
        )
        .register(
            EntityDecl::new("Tag")
                .table("tags")
                .primary_key("id")
                .field(FieldDecl::new("label")),
        )
        .register(
            EntityDecl::new("Team")
                .table("teams")
                .primary_key("id")
                .field(FieldDecl::new("name"))
                .field(FieldDecl::typed("owner_id", LogicalType::Number))
                .relationship(RelationshipDecl::belongs_to("owner", "Owner"))
                .relationship(RelationshipDecl::has_many("sites", "Site")),
        )
        .register(
            EntityDecl::new("Owner")
                .table("owners")
                .primary_key("id")
                .field(FieldDecl::new("name"))
                .field(FieldDecl::typed("team_id", LogicalType::Number))
                .relationship(RelationshipDecl::belongs_to("team", "Team")),
        )
        .build()
        .expect("fixture registry")
}
