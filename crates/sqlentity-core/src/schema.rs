//! External form/entity schema.
//!
//! A form schema is an optional second source of field metadata, usually
//! authored alongside UI definitions. During extraction its storage-column
//! mappings and types win over the entity's own declarations.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::LogicalType;
use crate::value::Value;

/// One field of a form schema.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub name: String,
    /// Storage column the field maps to.
    #[serde(default)]
    pub db_field: Option<String>,
    #[serde(default, rename = "type")]
    pub logical_type: Option<LogicalType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_field: None,
            logical_type: None,
            required: false,
            read_only: false,
            default: None,
        }
    }

    #[must_use]
    pub fn db_field(mut self, column: impl Into<String>) -> Self {
        self.db_field = Some(column.into());
        self
    }

    #[must_use]
    pub fn logical_type(mut self, ty: LogicalType) -> Self {
        self.logical_type = Some(ty);
        self
    }

    #[must_use]
    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    #[must_use]
    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Default as an application value.
    pub fn default_value(&self) -> Option<Value> {
        self.default.clone().map(Value::from)
    }
}

/// An ordered list of schema fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormSchema {
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

impl FormSchema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Parse a schema document: `{"fields": [{"name": ..., "dbField": ..., "type": ...}]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid form schema: {e}")).with_source(e))
    }

    pub fn get(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
