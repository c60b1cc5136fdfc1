//! Storage error classification.
//!
//! The error kind is chosen from the storage engine's structured code only.
//! Message and detail text are parsed afterwards, purely to fill in
//! human-readable context (offending column, value, constraint name).

use std::fmt;

use crate::error::{Error, ErrorDetails, ErrorKind, StorageError};
use crate::pattern::{capture_first, captures};

/// The façade operation during which a storage error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Count,
    /// Relationship loading.
    Relation,
    /// Begin/commit/rollback.
    Transaction,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Count => "count",
            Operation::Relation => "relation",
            Operation::Transaction => "transaction",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQLSTATE and client codes the classifier dispatches on.
pub mod codes {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const UNDEFINED_COLUMN: &str = "42703";
    pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";
    pub const INVALID_DATETIME_FORMAT: &str = "22007";
    pub const DATETIME_FIELD_OVERFLOW: &str = "22008";
    /// Server-side shutdown codes that drop the session.
    pub const ADMIN_SHUTDOWN: &[&str] = &["57P01", "57P02", "57P03"];
    /// Client-level network failures.
    pub const CLIENT_CONNECTION: &[&str] = &[
        "ECONNREFUSED",
        "ECONNRESET",
        "ETIMEDOUT",
        "EPIPE",
        "ENOTFOUND",
        "EHOSTUNREACH",
    ];
}

const KEY_VALUE: &str = r"Key \((.+?)\)=\((.*?)\)";
const UNIQUE_CONSTRAINT: &str = r#"unique constraint "([^"]+)""#;
const FK_CONSTRAINT: &str = r#"foreign key constraint "([^"]+)""#;
const NOT_PRESENT_IN: &str = r#"is not present in table "([^"]+)""#;
const STILL_REFERENCED: &str = r#"still referenced from table "([^"]+)""#;
const NULL_COLUMN: &str = r#"null value in column "([^"]+)""#;
const CHECK_CONSTRAINT: &str = r#"check constraint "([^"]+)""#;
const MISSING_RELATION: &str = r#"relation "([^"]+)" does not exist"#;
const MISSING_COLUMN: &str = r#"column "?([A-Za-z0-9_.]+)"?(?: of relation "[^"]+")? does not exist"#;
const INVALID_INPUT: &str = r"invalid input syntax for(?: type)? ([A-Za-z ]+?)(?::|$)";
const HOST_PORT: &str = r"([A-Za-z0-9_.\-]+):(\d{2,5})\b";

/// Classify a raw storage failure into a typed [`Error`].
///
/// Every classified error keeps the original code and message in its details.
/// The classifier never retries.
pub fn classify(raw: &StorageError, operation: Operation, entity: &str, table: &str) -> Error {
    let code = raw.code.as_deref().unwrap_or_default();
    let mut details = ErrorDetails {
        code: raw.code.clone(),
        original_message: Some(raw.message.clone()),
        operation: Some(operation.as_str().to_string()),
        entity: Some(entity.to_string()),
        table: Some(raw.table.clone().unwrap_or_else(|| table.to_string())),
        ..ErrorDetails::default()
    };
    // Detail text first (that is where PostgreSQL puts `Key (..)=(..)`), then message.
    let text = match &raw.detail {
        Some(detail) => format!("{detail}\n{}", raw.message),
        None => raw.message.clone(),
    };

    let (kind, message) = match code {
        codes::UNIQUE_VIOLATION => {
            fill_key_value(&mut details, &text);
            details.constraint = raw
                .constraint
                .clone()
                .or_else(|| capture_first(&text, UNIQUE_CONSTRAINT));
            let message = match (&details.field, &details.value) {
                (Some(field), Some(value)) => {
                    format!("{entity} with {field} '{value}' already exists")
                }
                _ => format!("{entity} already exists (unique constraint violated)"),
            };
            (ErrorKind::UniqueConstraint, message)
        }
        codes::FOREIGN_KEY_VIOLATION => {
            details.constraint = raw
                .constraint
                .clone()
                .or_else(|| capture_first(&text, FK_CONSTRAINT));
            let still_referenced = text.contains("still referenced");
            if operation == Operation::Delete || still_referenced {
                details.referencing_table = capture_first(&text, STILL_REFERENCED);
                let message = match &details.referencing_table {
                    Some(by) => format!("cannot delete {entity}: it is still referenced by {by}"),
                    None => format!("cannot delete {entity}: it is still referenced by other records"),
                };
                (ErrorKind::ForeignKey, message)
            } else {
                fill_key_value(&mut details, &text);
                details.referenced_table = capture_first(&text, NOT_PRESENT_IN);
                let target = details.referenced_table.as_deref().unwrap_or("the referenced table");
                let message = match (&details.field, &details.value) {
                    (Some(field), Some(value)) => {
                        format!("{field} '{value}' does not reference an existing record in {target}")
                    }
                    _ => format!("{entity} references a record that does not exist in {target}"),
                };
                (ErrorKind::ForeignKey, message)
            }
        }
        codes::NOT_NULL_VIOLATION => {
            let column = raw.column.clone().or_else(|| capture_first(&text, NULL_COLUMN));
            details.field.clone_from(&column);
            details.column = column;
            let message = match &details.field {
                Some(field) => format!("{field} is required"),
                None => format!("a required field of {entity} is missing"),
            };
            (ErrorKind::NotNull, message)
        }
        codes::CHECK_VIOLATION => {
            details.constraint = raw
                .constraint
                .clone()
                .or_else(|| capture_first(&text, CHECK_CONSTRAINT));
            let message = match &details.constraint {
                Some(c) => format!("{entity} violates check constraint {c}"),
                None => format!("{entity} violates a check constraint"),
            };
            (ErrorKind::Validation, message)
        }
        codes::UNDEFINED_TABLE => {
            if let Some(missing) = capture_first(&text, MISSING_RELATION) {
                details.table = Some(missing);
            }
            let missing = details.table.as_deref().unwrap_or(table);
            (
                ErrorKind::Configuration,
                format!("table {missing} for {entity} does not exist"),
            )
        }
        codes::UNDEFINED_COLUMN => {
            details.column = raw.column.clone().or_else(|| capture_first(&text, MISSING_COLUMN));
            let message = match &details.column {
                Some(c) => format!("column {c} of {entity} does not exist"),
                None => format!("{entity} references an unknown column"),
            };
            (ErrorKind::Configuration, message)
        }
        codes::INVALID_TEXT_REPRESENTATION | codes::INVALID_DATETIME_FORMAT | codes::DATETIME_FIELD_OVERFLOW => {
            details.expected_type = capture_first(&text, INVALID_INPUT)
                .map(|t| t.trim().to_string())
                .or_else(|| (code != codes::INVALID_TEXT_REPRESENTATION).then(|| "timestamp".to_string()));
            details.column.clone_from(&raw.column);
            let message = match &details.expected_type {
                Some(t) => format!("invalid value for {entity}: expected {t}"),
                None => format!("invalid value for {entity}"),
            };
            (ErrorKind::Validation, message)
        }
        c if is_connection_code(c) => {
            details.host.clone_from(&raw.host);
            details.port = raw.port;
            if details.host.is_none() {
                if let Some(caps) = captures(&raw.message, HOST_PORT) {
                    details.host = caps.first().cloned();
                    details.port = caps.get(1).and_then(|p| p.parse().ok());
                }
            }
            let message = match (&details.host, details.port) {
                (Some(h), Some(p)) => format!("storage connection to {h}:{p} failed during {operation}"),
                (Some(h), None) => format!("storage connection to {h} failed during {operation}"),
                _ => format!("storage connection failed during {operation}"),
            };
            (ErrorKind::Connection, message)
        }
        _ => (
            ErrorKind::Database,
            format!("{operation} {entity} failed: {}", raw.message),
        ),
    };

    tracing::debug!(
        kind = %kind,
        code = code,
        operation = %operation,
        entity = entity,
        "Classified storage error"
    );
    Error::new(kind, message)
        .with_details(details)
        .with_source(raw.clone())
}

/// True for SQLSTATE class 08, admin shutdown codes and client network codes.
pub fn is_connection_code(code: &str) -> bool {
    code.starts_with("08") || codes::ADMIN_SHUTDOWN.contains(&code) || codes::CLIENT_CONNECTION.contains(&code)
}

fn fill_key_value(details: &mut ErrorDetails, text: &str) {
    if let Some(caps) = captures(text, KEY_VALUE) {
        details.field = caps.first().cloned().filter(|s| !s.is_empty());
        details.value = caps.get(1).cloned();
    }
}
