//! Field declarations and canonical field descriptors.

use crate::types::LogicalType;
use crate::value::Value;

/// A scalar field as declared on an entity.
///
/// Only `name` is mandatory. Anything left unset may still be supplied by the
/// entity's form schema during extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Application-level field name.
    pub name: String,
    /// Storage column (defaults to `name`).
    pub column: Option<String>,
    /// Declared type (defaults to `string`).
    pub logical_type: Option<LogicalType>,
    pub required: bool,
    pub read_only: bool,
    /// Value applied by `build`/`create` when the caller omits the field.
    pub default: Option<Value>,
}

impl FieldDecl {
    /// Declare a field with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: None,
            logical_type: None,
            required: false,
            read_only: false,
            default: None,
        }
    }

    /// Declare a field of a given type.
    pub fn typed(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self::new(name).logical_type(logical_type)
    }

    /// Map to a differently-named storage column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn logical_type(mut self, logical_type: LogicalType) -> Self {
        self.logical_type = Some(logical_type);
        self
    }

    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Canonical metadata for one entity field, produced by extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Storage column; equals `name` unless mapped.
    pub column: String,
    pub logical_type: LogicalType,
    pub required: bool,
    pub read_only: bool,
    pub primary_key: bool,
    /// Managed `created_at`/`updated_at` style column.
    pub timestamp: bool,
    pub default: Option<Value>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            logical_type,
            required: false,
            read_only: false,
            primary_key: false,
            timestamp: false,
            default: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    pub fn timestamp(mut self, value: bool) -> Self {
        self.timestamp = value;
        self
    }

    /// True if the caller may write this field through create/update.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.read_only && !self.primary_key && !self.timestamp
    }
}

/// Look up a descriptor by field name, falling back to storage column.
pub fn find_field<'a>(fields: &'a [FieldDescriptor], key: &str) -> Option<&'a FieldDescriptor> {
    fields
        .iter()
        .find(|f| f.name == key)
        .or_else(|| fields.iter().find(|f| f.column == key))
}

/// Look up a descriptor by storage column only.
pub fn find_by_column<'a>(fields: &'a [FieldDescriptor], column: &str) -> Option<&'a FieldDescriptor> {
    fields.iter().find(|f| f.column == column)
}

/// Storage column for `key`, or `key` itself when unknown.
pub fn column_of<'a>(fields: &'a [FieldDescriptor], key: &'a str) -> &'a str {
    find_field(fields, key).map_or(key, |f| f.column.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::new("id", LogicalType::Number)
                .column("meter_id")
                .primary_key(true)
                .read_only(true),
            FieldDescriptor::new("name", LogicalType::String).required(true),
            FieldDescriptor::new("updated_at", LogicalType::Date).timestamp(true).read_only(true),
        ]
    }

    #[test]
    fn test_find_field_by_name_then_column() {
        let fields = fields();
        assert_eq!(find_field(&fields, "id").map(|f| f.column.as_str()), Some("meter_id"));
        assert_eq!(find_field(&fields, "meter_id").map(|f| f.name.as_str()), Some("id"));
        assert!(find_field(&fields, "missing").is_none());
        assert_eq!(column_of(&fields, "missing"), "missing");
        assert!(find_by_column(&fields, "id").is_none());
    }

    #[test]
    fn test_writability() {
        let fields = fields();
        assert!(!fields[0].is_writable());
        assert!(fields[1].is_writable());
        assert!(!fields[2].is_writable());
    }

    #[test]
    fn test_decl_builder() {
        let decl = FieldDecl::typed("installed_at", LogicalType::Date)
            .column("installed_on")
            .required(true)
            .default_value("2024-01-01");
        assert_eq!(decl.column.as_deref(), Some("installed_on"));
        assert_eq!(decl.logical_type, Some(LogicalType::Date));
        assert!(decl.required);
        assert_eq!(decl.default, Some(Value::from("2024-01-01")));
    }
}
