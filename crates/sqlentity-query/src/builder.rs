//! INSERT, UPDATE, DELETE, COUNT and EXISTS builders.
//!
//! All builders work from an entity's table name and field descriptors:
//! - application field names are mapped to storage columns
//! - values are serialized through the type codec and always bound
//! - INSERT, UPDATE and DELETE request the written row with `RETURNING *`
//!
//! UPDATE and DELETE refuse to run without conditions.

use sqlentity_core::codec::serialize_field;
use sqlentity_core::{Data, Error, ErrorKind, FieldDescriptor, Filter, Result, Value, find_field};

use crate::clause::{Statement, build_where, placeholder};

/// INSERT builder.
///
/// Only fields present in `data` are written; an explicit `Null` is written as
/// `NULL`. Managed timestamp columns the caller did not supply are set to
/// `NOW()`. Columns follow field declaration order.
#[derive(Debug)]
pub struct InsertBuilder<'a> {
    table: &'a str,
    fields: &'a [FieldDescriptor],
    data: &'a Data,
}

impl<'a> InsertBuilder<'a> {
    pub fn new(table: &'a str, fields: &'a [FieldDescriptor], data: &'a Data) -> Self {
        Self { table, fields, data }
    }

    pub fn build(&self) -> Result<Statement> {
        reject_unknown_keys(self.fields, self.data)?;

        let mut columns = Vec::new();
        let mut values = Vec::new();
        let mut params = Vec::new();
        for field in self.fields {
            match self.data.get(&field.name) {
                Some(value) if !field.timestamp => {
                    params.push(serialize_field(value, field.logical_type, &field.name)?);
                    columns.push(field.column.as_str());
                    values.push(placeholder(params.len()));
                }
                _ if field.timestamp => {
                    columns.push(field.column.as_str());
                    values.push("NOW()".to_string());
                }
                _ => {}
            }
        }

        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", self.table)
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                self.table,
                columns.join(", "),
                values.join(", ")
            )
        };
        Ok(Statement::new(sql, params))
    }
}

/// UPDATE builder.
///
/// The SET list holds the writable fields present in `data`; the primary key,
/// read-only and timestamp fields are skipped. With [`UpdateBuilder::touch`] the
/// named column is additionally set to `NOW()`.
#[derive(Debug)]
pub struct UpdateBuilder<'a> {
    table: &'a str,
    fields: &'a [FieldDescriptor],
    data: &'a Data,
    filter: Filter,
    touch: Option<&'a str>,
}

impl<'a> UpdateBuilder<'a> {
    pub fn new(table: &'a str, fields: &'a [FieldDescriptor], data: &'a Data) -> Self {
        Self {
            table,
            fields,
            data,
            filter: Filter::new(),
            touch: None,
        }
    }

    /// Scope the update.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Column to set to `NOW()` on every update.
    #[must_use]
    pub fn touch(mut self, column: Option<&'a str>) -> Self {
        self.touch = column;
        self
    }

    /// Build the statement, or `None` when `data` has nothing to set.
    pub fn build(&self) -> Result<Option<Statement>> {
        reject_unknown_keys(self.fields, self.data)?;

        let mut sets = Vec::new();
        let mut params = Vec::new();
        for field in self.fields.iter().filter(|f| f.is_writable()) {
            if let Some(value) = self.data.get(&field.name) {
                params.push(serialize_field(value, field.logical_type, &field.name)?);
                sets.push(format!("{} = {}", field.column, placeholder(params.len())));
            }
        }
        if sets.is_empty() {
            return Ok(None);
        }
        if let Some(column) = self.touch {
            sets.push(format!("{column} = NOW()"));
        }

        let fragment = require_conditions(&self.filter, self.table, params.len() + 1, self.fields, "UPDATE")?;
        params.extend(fragment.params);
        Ok(Some(Statement::new(
            format!(
                "UPDATE {} SET {} WHERE {} RETURNING *",
                self.table,
                sets.join(", "),
                fragment.sql
            ),
            params,
        )))
    }
}

/// DELETE builder; returns the removed rows.
#[derive(Debug)]
pub struct DeleteBuilder<'a> {
    table: &'a str,
    fields: &'a [FieldDescriptor],
    filter: Filter,
}

impl<'a> DeleteBuilder<'a> {
    pub fn new(table: &'a str, fields: &'a [FieldDescriptor]) -> Self {
        Self {
            table,
            fields,
            filter: Filter::new(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn build(&self) -> Result<Statement> {
        let fragment = require_conditions(&self.filter, self.table, 1, self.fields, "DELETE")?;
        Ok(Statement::new(
            format!("DELETE FROM {} WHERE {} RETURNING *", self.table, fragment.sql),
            fragment.params,
        ))
    }
}

/// `SELECT COUNT(*) AS count` builder.
#[derive(Debug)]
pub struct CountBuilder<'a> {
    table: &'a str,
    fields: &'a [FieldDescriptor],
    filter: &'a Filter,
}

impl<'a> CountBuilder<'a> {
    pub fn new(table: &'a str, fields: &'a [FieldDescriptor], filter: &'a Filter) -> Self {
        Self { table, fields, filter }
    }

    pub fn build(&self) -> Result<Statement> {
        let fragment = build_where(self.filter, Some(self.table), 1, Some(self.fields))?;
        let mut sql = format!("SELECT COUNT(*) AS count FROM {}", self.table);
        if !fragment.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }
        Ok(Statement::new(sql, fragment.params))
    }
}

/// Existence probe: `SELECT 1 AS one ... LIMIT 1`.
#[derive(Debug)]
pub struct ExistsBuilder<'a> {
    table: &'a str,
    fields: &'a [FieldDescriptor],
    filter: &'a Filter,
}

impl<'a> ExistsBuilder<'a> {
    pub fn new(table: &'a str, fields: &'a [FieldDescriptor], filter: &'a Filter) -> Self {
        Self { table, fields, filter }
    }

    pub fn build(&self) -> Result<Statement> {
        let fragment = build_where(self.filter, Some(self.table), 1, Some(self.fields))?;
        let mut sql = format!("SELECT 1 AS one FROM {}", self.table);
        if !fragment.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }
        sql.push_str(" LIMIT 1");
        Ok(Statement::new(sql, fragment.params))
    }
}

/// Read the count produced by a [`CountBuilder`] statement.
///
/// Drivers report `COUNT(*)` as an integer or as numeric text.
pub fn count_from(value: Option<&Value>) -> u64 {
    value
        .and_then(Value::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

fn reject_unknown_keys(fields: &[FieldDescriptor], data: &Data) -> Result<()> {
    match data.keys().find(|key| find_field(fields, key).is_none_or(|f| f.name != **key)) {
        Some(key) => Err(Error::validation(key.clone(), format!("unknown field '{key}'"))),
        None => Ok(()),
    }
}

fn require_conditions(
    filter: &Filter,
    table: &str,
    start_index: usize,
    fields: &[FieldDescriptor],
    verb: &str,
) -> Result<crate::clause::WhereFragment> {
    let fragment = build_where(filter, Some(table), start_index, Some(fields))?;
    if fragment.is_empty() {
        return Err(Error::new(
            ErrorKind::Validation,
            format!("refusing to {verb} {table} without conditions"),
        ));
    }
    Ok(fragment)
}
