//! Typed error taxonomy.
//!
//! Every failure leaving the core is an [`Error`] with a fixed [`ErrorKind`], a
//! human-readable message and structured [`ErrorDetails`]. Raw storage failures
//! ([`StorageError`]) are turned into `Error`s by [`crate::classify`]; they never
//! cross the core's boundary unclassified.

use std::fmt;

use serde::Serialize;

/// The fixed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Caller supplied bad input.
    Validation,
    /// A unique constraint rejected the write.
    UniqueConstraint,
    /// A foreign key rejected the write or the delete.
    ForeignKey,
    /// The targeted record does not exist.
    NotFound,
    /// A required column was null.
    NotNull,
    /// Transient infrastructure failure.
    Connection,
    /// Broken entity declaration; not recoverable at runtime.
    Configuration,
    /// Any other storage failure.
    Database,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::UniqueConstraint => "UniqueConstraint",
            ErrorKind::ForeignKey => "ForeignKey",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::NotNull => "NotNull",
            ErrorKind::Connection => "Connection",
            ErrorKind::Configuration => "Configuration",
            ErrorKind::Database => "Database",
        }
    }

    /// Conventional response status class for this kind.
    ///
    /// The core never maps errors to responses itself; this is the contract an
    /// HTTP layer is expected to follow.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::ForeignKey | ErrorKind::NotNull => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::UniqueConstraint => 409,
            ErrorKind::Connection => 503,
            ErrorKind::Configuration | ErrorKind::Database => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured context attached to an [`Error`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Storage engine error code (SQLSTATE or client code).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// The storage engine's original message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    /// Table a foreign key points at (insert/update violations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    /// Table still pointing at the row (delete violations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referencing_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Valid alternatives (e.g. relationship names) for configuration errors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available: Vec<String>,
    /// Set when rolling back after this error failed as well.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_error: Option<String>,
}

/// A typed error.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    details: ErrorDetails,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Create an error of a given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: ErrorDetails::default(),
            source: None,
        }
    }

    /// Validation error naming the offending field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::Validation, message);
        err.details.field = Some(field.into());
        err
    }

    /// Configuration error (broken declaration).
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Record not found.
    pub fn not_found(entity: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorKind::NotFound, message);
        err.details.entity = Some(entity.into());
        err
    }

    /// Replace the details payload.
    #[must_use]
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Set the entity name if not already present.
    #[must_use]
    pub fn in_entity(mut self, entity: &str) -> Self {
        if self.details.entity.is_none() {
            self.details.entity = Some(entity.to_string());
        }
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn details_mut(&mut self) -> &mut ErrorDetails {
        &mut self.details
    }

    /// See [`ErrorKind::status_code`].
    pub const fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Only connection failures are worth retrying, and only by the caller.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Connection)
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result alias used by synchronous core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A raw failure reported by the storage client.
///
/// Fields mirror what a PostgreSQL-style error response carries. Only `message`
/// is mandatory; `code` is the SQLSTATE or a client-level code such as
/// `ECONNREFUSED`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageError {
    pub code: Option<String>,
    pub message: String,
    pub detail: Option<String>,
    pub constraint: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl StorageError {
    /// Error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Error with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for StorageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_convention() {
        assert_eq!(ErrorKind::Validation.status_code(), 400);
        assert_eq!(ErrorKind::ForeignKey.status_code(), 400);
        assert_eq!(ErrorKind::NotNull.status_code(), 400);
        assert_eq!(ErrorKind::NotFound.status_code(), 404);
        assert_eq!(ErrorKind::UniqueConstraint.status_code(), 409);
        assert_eq!(ErrorKind::Connection.status_code(), 503);
        assert_eq!(ErrorKind::Configuration.status_code(), 500);
    }

    #[test]
    fn test_validation_error_names_field() {
        let err = Error::validation("installed_at", "invalid date");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.details().field.as_deref(), Some("installed_at"));
        assert_eq!(err.to_string(), "Validation: invalid date");
    }

    #[test]
    fn test_details_serialize_camel_case_and_skip_empty() {
        let details = ErrorDetails {
            referenced_table: Some("teams".into()),
            ..ErrorDetails::default()
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json, serde_json::json!({"referencedTable": "teams"}));
    }

    #[test]
    fn test_source_is_exposed() {
        use std::error::Error as _;
        let err = Error::new(ErrorKind::Database, "boom")
            .with_source(StorageError::new("XX000", "internal"));
        assert!(err.source().is_some());
        assert!(!err.is_retryable());
    }
}
