//! Core types and metadata for sqlentity.
//!
//! `sqlentity-core` is the **foundation layer** of the workspace. Everything the
//! SQL builders and the façade agree on lives here.
//!
//! # Role In The Architecture
//!
//! - **Data model**: [`Value`], [`Row`] and [`QueryResult`] carry statement inputs
//!   and outputs.
//! - **Entity metadata**: [`EntityDecl`] declarations are validated into
//!   [`Entity`] descriptors held by a [`Registry`]; [`extract_fields`] produces the
//!   canonical [`FieldDescriptor`] set.
//! - **Type codec**: [`codec`] converts between application values and their
//!   storage representations per [`LogicalType`].
//! - **Errors**: the typed [`Error`] taxonomy and the [`classify`] function that
//!   maps raw [`StorageError`]s onto it.
//! - **Storage contract**: [`Connection`], [`Executor`] and [`TransactionOps`] are
//!   implemented by the injected storage client. `Cx` and `Outcome` are
//!   re-exported from asupersync so every storage call is cancel-aware.
//!
//! Most applications should use the `sqlentity` façade; reach for this crate
//! directly when implementing a storage client.

pub use asupersync::{Cx, Outcome};

pub mod classify;
pub mod codec;
pub mod connection;
pub mod entity;
pub mod error;
pub mod field;
pub mod filter;
pub mod identifiers;
pub mod pattern;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use classify::{Operation, classify};
pub use connection::{Connection, Executor, TransactionOps};
pub use entity::{EntityDecl, Entity, Member, Registry, RegistryBuilder, TimestampColumns, extract_fields};
pub use error::{Error, ErrorDetails, ErrorKind, Result, StorageError};
pub use field::{FieldDecl, FieldDescriptor, column_of, find_by_column, find_field};
pub use filter::{Condition, Filter, Operator, OrderBy, SortDirection};
pub use identifiers::{is_valid_identifier, to_snake_case, validate_identifier};
pub use relationship::{LinkTable, Relationship, RelationshipDecl, RelationshipKind};
pub use row::{QueryResult, Row};
pub use schema::{FormSchema, SchemaField};
pub use types::LogicalType;
pub use value::{Data, Value, data_from_json};
