//! WHERE clause construction.
//!
//! [`build_where`] turns a [`Filter`] into a SQL fragment plus its bound
//! parameters. Placeholders are numbered from a caller-supplied start index so
//! independently built fragments (a caller filter and a relationship scope, the
//! SET list of an UPDATE and its WHERE) compose into one statement with
//! contiguous `$n` numbering.

use asupersync::{Cx, Outcome};
use sqlentity_core::codec::serialize_field;
use sqlentity_core::{
    Error, ErrorKind, Executor, FieldDescriptor, Filter, Operator, QueryResult, Result, StorageError,
    Value, find_field, is_valid_identifier,
};

/// A complete SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Run the statement on any executor.
    pub async fn execute<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        executor: &E,
    ) -> Outcome<QueryResult, StorageError> {
        executor.query(cx, &self.sql, &self.params).await
    }
}

/// A WHERE fragment without the `WHERE` keyword.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereFragment {
    /// Conditions joined with `AND`; empty when the filter was empty.
    pub sql: String,
    pub params: Vec<Value>,
    /// First placeholder index not used by this fragment.
    pub next_index: usize,
}

impl WhereFragment {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Positional placeholder `$n`.
#[must_use]
pub fn placeholder(index: usize) -> String {
    format!("${index}")
}

/// `alias.column`, or the bare column without an alias.
#[must_use]
pub fn qualify(alias: Option<&str>, column: &str) -> String {
    match alias {
        Some(alias) => format!("{alias}.{column}"),
        None => column.to_string(),
    }
}

/// Build a WHERE fragment.
///
/// With `fields`, each key must name a field (or its storage column); the key is
/// translated to the storage column and values are serialized through the type
/// codec. Without `fields` the key is used verbatim after identifier
/// validation and values are bound as given.
///
/// The number of placeholders emitted always equals `params.len()`, numbered
/// contiguously from `start_index`.
pub fn build_where(
    filter: &Filter,
    alias: Option<&str>,
    start_index: usize,
    fields: Option<&[FieldDescriptor]>,
) -> Result<WhereFragment> {
    let mut parts: Vec<String> = Vec::with_capacity(filter.len());
    let mut params: Vec<Value> = Vec::new();
    let mut index = start_index;

    for (key, condition) in filter.iter() {
        let (column, descriptor) = resolve_key(key, fields)?;
        let target = qualify(alias, column);
        let encode = |value: &Value| -> Result<Value> {
            match descriptor {
                Some(field) => serialize_field(value, field.logical_type, &field.name),
                None => Ok(value.clone()),
            }
        };

        let op = condition.to_operator();
        match &op {
            Operator::Eq(v) if v.is_null() => parts.push(format!("{target} IS NULL")),
            Operator::Ne(v) if v.is_null() => parts.push(format!("{target} IS NOT NULL")),
            Operator::Eq(v)
            | Operator::Ne(v)
            | Operator::Gt(v)
            | Operator::Gte(v)
            | Operator::Lt(v)
            | Operator::Lte(v) => {
                parts.push(format!("{target} {} {}", op.sql_op(), placeholder(index)));
                params.push(encode(v)?);
                index += 1;
            }
            Operator::In(values) if values.is_empty() => parts.push("1 = 0".to_string()),
            Operator::In(values) => {
                let mut holders = Vec::with_capacity(values.len());
                for v in values {
                    holders.push(placeholder(index));
                    params.push(encode(v)?);
                    index += 1;
                }
                parts.push(format!("{target} IN ({})", holders.join(", ")));
            }
            Operator::Between(low, high) => {
                parts.push(format!(
                    "{target} BETWEEN {} AND {}",
                    placeholder(index),
                    placeholder(index + 1)
                ));
                params.push(encode(low)?);
                params.push(encode(high)?);
                index += 2;
            }
            Operator::Like(pattern) => {
                parts.push(format!("{target} LIKE {}", placeholder(index)));
                params.push(Value::Text(pattern.clone()));
                index += 1;
            }
        }
    }

    Ok(WhereFragment {
        sql: parts.join(" AND "),
        params,
        next_index: index,
    })
}

fn resolve_key<'a>(
    key: &'a str,
    fields: Option<&'a [FieldDescriptor]>,
) -> Result<(&'a str, Option<&'a FieldDescriptor>)> {
    match fields {
        Some(fields) => find_field(fields, key)
            .map(|f| (f.column.as_str(), Some(f)))
            .ok_or_else(|| {
                Error::validation(key, format!("unknown field '{key}' in filter"))
            }),
        None if is_valid_identifier(key) => Ok((key, None)),
        None => {
            let mut err = Error::new(
                ErrorKind::Validation,
                format!("invalid column name '{key}' in filter"),
            );
            err.details_mut().field = Some(key.to_string());
            Err(err)
        }
    }
}
