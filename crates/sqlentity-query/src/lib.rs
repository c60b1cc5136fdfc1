//! Parameterized SQL statement builders for sqlentity.
//!
//! `sqlentity-query` turns entity metadata plus per-call inputs into
//! [`Statement`]s: SQL text with positional `$n` placeholders and a parallel
//! parameter list. No value is ever interpolated into SQL text; only validated
//! identifiers and integer LIMIT/OFFSET literals are.
//!
//! # Role In The Architecture
//!
//! - **WHERE construction**: [`build_where`] translates a [`Filter`](sqlentity_core::Filter)
//!   onto storage columns with contiguous placeholder numbering.
//! - **Write statements**: [`InsertBuilder`], [`UpdateBuilder`], [`DeleteBuilder`].
//! - **Reads**: [`SelectBuilder`] (with eager LEFT JOINs), [`CountBuilder`],
//!   [`ExistsBuilder`] and [`RelatedSelectBuilder`] for batch relationship loads.
//! - **Row mapping**: [`map_joined_rows`] folds joined result rows back into
//!   base records with nested relationship rows.

pub mod builder;
pub mod clause;
pub mod mapper;
pub mod select;

pub use builder::{CountBuilder, DeleteBuilder, ExistsBuilder, InsertBuilder, UpdateBuilder, count_from};
pub use clause::{Statement, WhereFragment, build_where, placeholder, qualify};
pub use mapper::{MappedRecord, RelatedRows, map_joined_rows};
pub use select::{
    Include, JoinedRelation, PARENT_KEY_ALIAS, QuerySpec, RelatedSelectBuilder, RelationshipMap,
    SelectBuilder, SelectStatement, join_alias,
};
