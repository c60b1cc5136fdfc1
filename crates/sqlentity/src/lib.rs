//! sqlentity: declarative entities over an injected SQL storage client.
//!
//! `sqlentity` is the **user-facing facade** of the workspace. It turns entity
//! declarations into parameterized statements, runs them through a storage
//! client the application supplies, and returns typed records with their
//! relationships attached.
//!
//! # Role In The Architecture
//!
//! - **Registry**: entities are declared once and validated at start-up
//!   (`sqlentity-core`).
//! - **Statements**: every SQL string comes from `sqlentity-query`; values are
//!   always bound parameters.
//! - **Facade**: [`Orm`] and [`Model`] expose create/find/count/exists and the
//!   relationship loaders; [`Instance`] carries update/delete/save/reload.
//! - **Errors**: raw storage failures are classified into [`Error`] at the one
//!   place statements are executed.
//!
//! # Example
//!
//! ```ignore
//! let registry = Registry::builder()
//!     .register(
//!         EntityDecl::new("Meter")
//!             .table("meters")
//!             .primary_key("id")
//!             .timestamps(true)
//!             .field(FieldDecl::typed("id", LogicalType::Number).column("meter_id"))
//!             .field(FieldDecl::new("name").required(true))
//!             .relationship(RelationshipDecl::belongs_to("site", "Site")),
//!     )
//!     .register(EntityDecl::new("Site").table("sites").primary_key("id"))
//!     .build()?;
//!
//! let orm = Orm::new(registry);
//! let meters = orm.model("Meter")?;
//! let meter = meters.create(&cx, &pool, data).await;
//! let page = meters.find_all(&cx, &pool, QuerySpec::new().include("site").limit(20)).await;
//! ```

/// Unwrap `Outcome::Ok`, returning any other outcome from the enclosing function.
macro_rules! try_outcome {
    ($expr:expr) => {
        match $expr {
            ::asupersync::Outcome::Ok(value) => value,
            ::asupersync::Outcome::Err(err) => return ::asupersync::Outcome::Err(err),
            ::asupersync::Outcome::Cancelled(reason) => return ::asupersync::Outcome::Cancelled(reason),
            ::asupersync::Outcome::Panicked(payload) => return ::asupersync::Outcome::Panicked(payload),
        }
    };
}

/// Unwrap a `Result`, returning its error as `Outcome::Err`.
macro_rules! try_result {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(err) => return ::asupersync::Outcome::Err(err),
        }
    };
}

pub mod config;
mod exec;
pub mod instance;
pub mod model;
mod resolver;
pub mod transaction;

pub use config::OrmConfig;
pub use instance::{Instance, Related};
pub use model::{Model, Orm, Page, Pagination};
pub use transaction::{TxScope, transaction};

pub use sqlentity_core::{
    Condition, Connection, Cx, Data, Entity, EntityDecl, Error, ErrorDetails, ErrorKind, Executor,
    FieldDecl, FieldDescriptor, Filter, FormSchema, LinkTable, LogicalType, Operation, Operator,
    OrderBy, Outcome, QueryResult, Registry, RegistryBuilder, Relationship, RelationshipDecl,
    RelationshipKind, Result, Row, SchemaField, SortDirection, StorageError, TimestampColumns,
    TransactionOps, Value, data_from_json,
};
pub use sqlentity_query::{Include, QuerySpec};

/// Everything an application usually needs.
pub mod prelude {
    pub use crate::{
        Condition, Connection, Cx, Data, EntityDecl, Error, ErrorKind, Executor, FieldDecl, Filter,
        FormSchema, Include, Instance, LogicalType, Model, Operator, Orm, OrmConfig, OrderBy,
        Outcome, Page, Pagination, QuerySpec, Registry, Related, RelationshipDecl, Result,
        StorageError, TransactionOps, TxScope, Value, transaction,
    };
}
