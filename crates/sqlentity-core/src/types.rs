//! Logical (application-level) field types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// The declared type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogicalType {
    #[default]
    String,
    Number,
    Boolean,
    /// Instant in time; stored as ISO-8601 text.
    Date,
    /// JSON object; stored as JSON text.
    Object,
    /// JSON array; stored as JSON text.
    Array,
}

impl LogicalType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogicalType::String => "string",
            LogicalType::Number => "number",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Object => "object",
            LogicalType::Array => "array",
        }
    }

    /// Parse a type name, case-insensitively, accepting common aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Some(LogicalType::String),
            "number" | "integer" | "float" | "decimal" => Some(LogicalType::Number),
            "boolean" | "bool" => Some(LogicalType::Boolean),
            "date" | "datetime" | "timestamp" => Some(LogicalType::Date),
            "object" | "json" => Some(LogicalType::Object),
            "array" => Some(LogicalType::Array),
            _ => None,
        }
    }

    /// Types whose storage form is JSON text.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, LogicalType::Object | LogicalType::Array)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::configuration(format!("unknown field type {s:?}")))
    }
}

impl Serialize for LogicalType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LogicalType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown field type {raw:?}")))
    }
}
