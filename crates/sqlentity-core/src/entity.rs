//! Entity declarations, field extraction and the entity registry.
//!
//! An application declares each entity once with an [`EntityDecl`], registers
//! them all with a [`RegistryBuilder`] at start-up, and hands the built
//! [`Registry`] to the facade. Field extraction and relationship resolution run
//! exactly once per entity, inside [`RegistryBuilder::build`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Error, ErrorDetails, ErrorKind, Result};
use crate::field::{FieldDecl, FieldDescriptor, find_field};
use crate::filter::OrderBy;
use crate::identifiers::{to_snake_case, validate_identifier};
use crate::relationship::{LinkTable, Relationship, RelationshipDecl, RelationshipKind};
use crate::schema::FormSchema;
use crate::types::LogicalType;

/// Names of the automatically managed timestamp columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampColumns {
    pub created_at: String,
    pub updated_at: String,
}

impl Default for TimestampColumns {
    fn default() -> Self {
        Self {
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
        }
    }
}

/// One declared member of an entity: a scalar field or a relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Scalar(FieldDecl),
    Relation(RelationshipDecl),
}

impl From<FieldDecl> for Member {
    fn from(decl: FieldDecl) -> Self {
        Member::Scalar(decl)
    }
}

impl From<RelationshipDecl> for Member {
    fn from(decl: RelationshipDecl) -> Self {
        Member::Relation(decl)
    }
}

/// Declarative description of an entity.
///
/// `table` and `primary_key` are optional here so that a partially configured
/// declaration can be assembled in steps; extraction rejects it if either is
/// still missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDecl {
    pub name: String,
    pub table: Option<String>,
    /// Primary-key field name.
    pub primary_key: Option<String>,
    pub timestamps: Option<TimestampColumns>,
    pub members: Vec<Member>,
    pub schema: Option<FormSchema>,
}

impl EntityDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Manage `created_at` / `updated_at` automatically.
    #[must_use]
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled.then(TimestampColumns::default);
        self
    }

    /// Manage timestamps under custom column names.
    #[must_use]
    pub fn timestamp_columns(mut self, created_at: impl Into<String>, updated_at: impl Into<String>) -> Self {
        self.timestamps = Some(TimestampColumns {
            created_at: created_at.into(),
            updated_at: updated_at.into(),
        });
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldDecl) -> Self {
        self.members.push(Member::Scalar(field));
        self
    }

    #[must_use]
    pub fn relationship(mut self, relationship: RelationshipDecl) -> Self {
        self.members.push(Member::Relation(relationship));
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: FormSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn scalars(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Scalar(f) => Some(f),
            Member::Relation(_) => None,
        })
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Relation(r) => Some(r),
            Member::Scalar(_) => None,
        })
    }
}

/// Produce the canonical ordered field set for an entity.
///
/// Declared scalar fields come first in declaration order, then schema-only
/// fields in schema order. The primary key is synthesized (as a read-only
/// number, placed first) when not declared; managed timestamp columns are
/// synthesized (as read-only dates, placed last) when not declared.
#[tracing::instrument(level = "debug", skip(decl), fields(entity = %decl.name))]
pub fn extract_fields(decl: &EntityDecl) -> Result<Vec<FieldDescriptor>> {
    let table = decl
        .table
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| config_error(&decl.name, format!("entity '{}' has no table configured", decl.name)))?;
    validate_identifier(table, "table").map_err(|e| e.in_entity(&decl.name))?;
    let primary_key = decl
        .primary_key
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            config_error(&decl.name, format!("entity '{}' has no primary key configured", decl.name))
        })?;

    let empty_schema = FormSchema::default();
    let schema = decl.schema.as_ref().unwrap_or(&empty_schema);
    let mut fields: Vec<FieldDescriptor> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for declared in decl.scalars() {
        if declared.name.is_empty() {
            return Err(config_error(&decl.name, format!("entity '{}' declares a field with no name", decl.name)));
        }
        if !seen.insert(declared.name.as_str()) {
            return Err(config_error(
                &decl.name,
                format!("entity '{}' declares field '{}' twice", decl.name, declared.name),
            ));
        }
        let from_schema = schema.get(&declared.name);
        let column = from_schema
            .and_then(|s| s.db_field.clone())
            .or_else(|| declared.column.clone())
            .unwrap_or_else(|| declared.name.clone());
        let logical_type = from_schema
            .and_then(|s| s.logical_type)
            .or(declared.logical_type)
            .unwrap_or_default();
        let mut descriptor = FieldDescriptor::new(declared.name.clone(), logical_type)
            .column(column)
            .required(declared.required || from_schema.is_some_and(|s| s.required))
            .read_only(declared.read_only || from_schema.is_some_and(|s| s.read_only));
        descriptor.default = declared
            .default
            .clone()
            .or_else(|| from_schema.and_then(|s| s.default_value()));
        fields.push(descriptor);
    }

    for schema_only in schema.fields.iter().filter(|s| !seen.contains(s.name.as_str())) {
        if fields.iter().any(|f| f.name == schema_only.name) {
            return Err(config_error(
                &decl.name,
                format!("form schema for '{}' lists field '{}' twice", decl.name, schema_only.name),
            ));
        }
        let mut descriptor =
            FieldDescriptor::new(schema_only.name.clone(), schema_only.logical_type.unwrap_or_default())
                .required(schema_only.required)
                .read_only(schema_only.read_only);
        if let Some(column) = &schema_only.db_field {
            descriptor.column.clone_from(column);
        }
        descriptor.default = schema_only.default_value();
        fields.push(descriptor);
    }

    match fields.iter_mut().find(|f| f.name == primary_key) {
        Some(pk) => {
            pk.primary_key = true;
            pk.read_only = true;
        }
        None => fields.insert(
            0,
            FieldDescriptor::new(primary_key, LogicalType::Number)
                .primary_key(true)
                .read_only(true),
        ),
    }

    if let Some(ts) = &decl.timestamps {
        for column in [&ts.created_at, &ts.updated_at] {
            match fields.iter_mut().find(|f| f.name == *column || f.column == *column) {
                Some(existing) => {
                    existing.timestamp = true;
                    existing.read_only = true;
                }
                None => fields.push(
                    FieldDescriptor::new(column.clone(), LogicalType::Date)
                        .timestamp(true)
                        .read_only(true),
                ),
            }
        }
    }

    let mut columns: HashSet<&str> = HashSet::new();
    for field in &fields {
        validate_identifier(&field.column, "column").map_err(|e| e.in_entity(&decl.name))?;
        if !columns.insert(field.column.as_str()) {
            return Err(config_error(
                &decl.name,
                format!("entity '{}' maps two fields onto column '{}'", decl.name, field.column),
            ));
        }
    }

    tracing::debug!(entity = %decl.name, fields = fields.len(), "Extracted field descriptors");
    Ok(fields)
}

/// A fully resolved entity.
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    table: String,
    primary_key: String,
    primary_key_column: String,
    timestamps: Option<TimestampColumns>,
    fields: Arc<[FieldDescriptor]>,
    relationships: Vec<Relationship>,
}

impl Entity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary-key field name.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Primary-key storage column.
    pub fn primary_key_column(&self) -> &str {
        &self.primary_key_column
    }

    pub fn timestamps(&self) -> Option<&TimestampColumns> {
        self.timestamps.as_ref()
    }

    pub fn manages_timestamps(&self) -> bool {
        self.timestamps.is_some()
    }

    /// The cached field set. Every call returns the same allocation.
    pub fn fields(&self) -> &Arc<[FieldDescriptor]> {
        &self.fields
    }

    /// Field by name or storage column.
    pub fn field(&self, key: &str) -> Option<&FieldDescriptor> {
        find_field(&self.fields, key)
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationship by name or alias.
    ///
    /// An unknown name is a configuration error listing what is available.
    pub fn relationship(&self, name: &str) -> Result<&Relationship> {
        self.relationships.iter().find(|r| r.answers_to(name)).ok_or_else(|| {
            let available: Vec<String> = self.relationships.iter().map(|r| r.name.clone()).collect();
            let message = if available.is_empty() {
                format!("entity '{}' has no relationship '{name}' (it declares none)", self.name)
            } else {
                format!(
                    "entity '{}' has no relationship '{name}'; available: {}",
                    self.name,
                    available.join(", ")
                )
            };
            Error::configuration(message).with_details(ErrorDetails {
                entity: Some(self.name.clone()),
                table: Some(self.table.clone()),
                available,
                ..ErrorDetails::default()
            })
        })
    }

    /// Relationships flagged `auto_load`.
    pub fn auto_load_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| r.auto_load)
    }
}

/// Collects entity declarations before validation.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    decls: Vec<EntityDecl>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, decl: EntityDecl) -> Self {
        self.decls.push(decl);
        self
    }

    /// Extract every entity's fields and resolve every relationship.
    pub fn build(self) -> Result<Registry> {
        let mut pending: Vec<(EntityDecl, Vec<FieldDescriptor>)> = Vec::with_capacity(self.decls.len());
        let mut names: HashSet<String> = HashSet::new();
        for decl in self.decls {
            if decl.name.is_empty() {
                return Err(Error::configuration("entity declared without a name"));
            }
            if !names.insert(decl.name.clone()) {
                return Err(config_error(&decl.name, format!("entity '{}' registered twice", decl.name)));
            }
            let fields = extract_fields(&decl)?;
            pending.push((decl, fields));
        }

        let shapes: HashMap<&str, Shape<'_>> = pending
            .iter()
            .map(|(decl, fields)| {
                let pk = decl.primary_key.as_deref().unwrap_or_default();
                let pk_column = fields
                    .iter()
                    .find(|f| f.primary_key)
                    .map_or(pk, |f| f.column.as_str());
                (
                    decl.name.as_str(),
                    Shape {
                        name: decl.name.as_str(),
                        table: decl.table.as_deref().unwrap_or_default(),
                        pk_column,
                        fields,
                    },
                )
            })
            .collect();

        let mut entities = HashMap::with_capacity(pending.len());
        let mut order = Vec::with_capacity(pending.len());
        for (decl, fields) in &pending {
            let owner = &shapes[decl.name.as_str()];
            let mut relationships: Vec<Relationship> = Vec::new();
            for rel in decl.relationships() {
                if fields.iter().any(|f| f.name == rel.name) {
                    return Err(config_error(
                        &decl.name,
                        format!("relationship '{}' on '{}' collides with a field of the same name", rel.name, decl.name),
                    ));
                }
                if relationships.iter().any(|r| r.name == rel.name) {
                    return Err(config_error(
                        &decl.name,
                        format!("entity '{}' declares relationship '{}' twice", decl.name, rel.name),
                    ));
                }
                relationships.push(resolve_relationship(&decl.name, owner, rel, &shapes)?);
            }

            let primary_key = decl.primary_key.clone().unwrap_or_default();
            let entity = Entity {
                name: decl.name.clone(),
                table: owner.table.to_string(),
                primary_key,
                primary_key_column: owner.pk_column.to_string(),
                timestamps: decl.timestamps.clone(),
                fields: Arc::from(fields.as_slice()),
                relationships,
            };
            tracing::debug!(
                entity = %entity.name,
                table = %entity.table,
                relationships = entity.relationships.len(),
                "Registered entity"
            );
            order.push(decl.name.clone());
            entities.insert(decl.name.clone(), Arc::new(entity));
        }

        tracing::info!(entities = entities.len(), "Entity registry built");
        Ok(Registry { entities, order })
    }
}

/// What relationship resolution needs to know about each entity.
struct Shape<'a> {
    name: &'a str,
    table: &'a str,
    pk_column: &'a str,
    fields: &'a [FieldDescriptor],
}

impl Shape<'_> {
    /// Resolve a relationship key (field name or column) to a storage column.
    ///
    /// The key must be a field of this entity: batch loading reads it from
    /// materialized instances, which only carry declared fields.
    fn key_column(&self, key: &str, owner_name: &str, rel_name: &str) -> Result<String> {
        find_field(self.fields, key).map(|f| f.column.clone()).ok_or_else(|| {
            let mut available: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
            available.sort();
            let mut err = config_error(
                owner_name,
                format!(
                    "relationship '{rel_name}' on '{owner_name}' uses key '{key}', which is not a field of '{}'",
                    self.name
                ),
            );
            let details = err.details_mut();
            details.field = Some(key.to_string());
            details.table = Some(self.table.to_string());
            details.available = available;
            err
        })
    }
}

fn resolve_relationship(
    owner_name: &str,
    owner: &Shape<'_>,
    rel: &RelationshipDecl,
    shapes: &HashMap<&str, Shape<'_>>,
) -> Result<Relationship> {
    validate_identifier(&rel.name, "relationship").map_err(|e| e.in_entity(owner_name))?;
    let Some(target) = shapes.get(rel.target.as_str()) else {
        let mut available: Vec<String> = shapes.keys().map(ToString::to_string).collect();
        available.sort();
        return Err(Error::configuration(format!(
            "relationship '{}' on '{owner_name}' targets unknown entity '{}'",
            rel.name, rel.target
        ))
        .with_details(ErrorDetails {
            entity: Some(owner_name.to_string()),
            available,
            ..ErrorDetails::default()
        }));
    };

    let owner_fk = format!("{}_id", to_snake_case(owner_name));
    let target_fk = format!("{}_id", to_snake_case(&rel.target));

    if rel.kind != RelationshipKind::ManyToMany && rel.through.is_some() {
        return Err(config_error(
            owner_name,
            format!("relationship '{}' on '{owner_name}' is {} but declares a junction table", rel.name, rel.kind.as_str()),
        ));
    }

    let (foreign_key, target_key, local_key, remote_key, link) = match rel.kind {
        RelationshipKind::BelongsTo => {
            let fk = owner.key_column(rel.foreign_key.as_deref().unwrap_or(&target_fk), owner_name, &rel.name)?;
            let tk = target.key_column(rel.target_key.as_deref().unwrap_or(target.pk_column), owner_name, &rel.name)?;
            (fk.clone(), tk.clone(), fk, tk, None)
        }
        RelationshipKind::HasOne | RelationshipKind::HasMany => {
            let fk = target.key_column(rel.foreign_key.as_deref().unwrap_or(&owner_fk), owner_name, &rel.name)?;
            let tk = owner.key_column(rel.target_key.as_deref().unwrap_or(owner.pk_column), owner_name, &rel.name)?;
            (fk.clone(), tk.clone(), tk, fk, None)
        }
        RelationshipKind::ManyToMany => {
            let Some(through) = rel.through.as_deref() else {
                return Err(config_error(
                    owner_name,
                    format!("many-to-many relationship '{}' on '{owner_name}' has no junction table", rel.name),
                ));
            };
            validate_identifier(through, "junction table").map_err(|e| e.in_entity(owner_name))?;
            let local_column = rel.foreign_key.clone().unwrap_or(owner_fk);
            let remote_column = rel.through_target_key.clone().unwrap_or(target_fk);
            validate_identifier(&local_column, "junction column").map_err(|e| e.in_entity(owner_name))?;
            validate_identifier(&remote_column, "junction column").map_err(|e| e.in_entity(owner_name))?;
            let tk = owner.key_column(rel.target_key.as_deref().unwrap_or(owner.pk_column), owner_name, &rel.name)?;
            (
                local_column.clone(),
                tk.clone(),
                tk,
                target.pk_column.to_string(),
                Some(LinkTable::new(through, local_column, remote_column)),
            )
        }
    };
    for key in [&foreign_key, &target_key, &local_key, &remote_key] {
        validate_identifier(key, "relationship key").map_err(|e| e.in_entity(owner_name))?;
    }

    let mut selected_columns = Vec::with_capacity(rel.selected_columns.len());
    for key in &rel.selected_columns {
        let column = find_field(target.fields, key).map(|f| f.column.clone()).ok_or_else(|| {
            config_error(
                owner_name,
                format!("relationship '{}' on '{owner_name}' selects unknown field '{key}' of '{}'", rel.name, rel.target),
            )
        })?;
        if !selected_columns.contains(&column) {
            selected_columns.push(column);
        }
    }
    if !selected_columns.is_empty() {
        for required in [target.pk_column.to_string(), remote_key.clone()] {
            if !selected_columns.contains(&required) {
                selected_columns.insert(0, required);
            }
        }
    }

    let mut order_by = Vec::with_capacity(rel.order_by.len());
    for order in &rel.order_by {
        let field = find_field(target.fields, &order.field).ok_or_else(|| {
            config_error(
                owner_name,
                format!(
                    "relationship '{}' on '{owner_name}' orders by unknown field '{}' of '{}'",
                    rel.name, order.field, rel.target
                ),
            )
        })?;
        order_by.push(OrderBy {
            field: field.column.clone(),
            direction: order.direction,
        });
    }

    Ok(Relationship {
        name: rel.name.clone(),
        kind: rel.kind,
        target: rel.target.clone(),
        target_table: target.table.to_string(),
        foreign_key,
        target_key,
        local_key,
        remote_key,
        link,
        alias: rel.alias.clone(),
        auto_load: rel.auto_load,
        selected_columns,
        extra_filters: rel.extra_filters.clone(),
        order_by,
        limit: rel.limit,
    })
}

fn config_error(entity: &str, message: String) -> Error {
    Error::new(ErrorKind::Configuration, message).in_entity(entity)
}

/// Immutable set of resolved entities, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entities: HashMap<String, Arc<Entity>>,
    order: Vec<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Entity by name; unknown names are a configuration error.
    pub fn get(&self, name: &str) -> Result<&Arc<Entity>> {
        self.entities.get(name).ok_or_else(|| {
            Error::configuration(format!("unknown entity '{name}'")).with_details(ErrorDetails {
                entity: Some(name.to_string()),
                available: self.order.clone(),
                ..ErrorDetails::default()
            })
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// The cached field set of an entity (same allocation on every call).
    pub fn fields(&self, name: &str) -> Result<Arc<[FieldDescriptor]>> {
        self.get(name).map(|e| Arc::clone(e.fields()))
    }

    /// Entity names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaField;
    use crate::value::Value;

    fn meter() -> EntityDecl {
        EntityDecl::new("Meter")
            .table("meters")
            .primary_key("id")
            .timestamps(true)
            .field(FieldDecl::typed("id", LogicalType::Number).column("meter_id"))
            .field(FieldDecl::typed("name", LogicalType::String).required(true))
            .field(FieldDecl::new("type"))
            .field(FieldDecl::new("status").default_value("active"))
            .field(FieldDecl::typed("site_id", LogicalType::Number))
            .relationship(RelationshipDecl::belongs_to("site", "Site"))
            .relationship(RelationshipDecl::has_many("readings", "Reading"))
    }

    fn site() -> EntityDecl {
        EntityDecl::new("Site")
            .table("sites")
            .primary_key("id")
            .field(FieldDecl::new("name"))
    }

    fn reading() -> EntityDecl {
        EntityDecl::new("Reading")
            .table("readings")
            .primary_key("id")
            .field(FieldDecl::typed("meter_id", LogicalType::Number))
            .field(FieldDecl::typed("value", LogicalType::Number))
    }

    #[test]
    fn test_missing_table_is_configuration_error() {
        let err = extract_fields(&EntityDecl::new("Base").primary_key("id")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("no table"));
        assert_eq!(err.details().entity.as_deref(), Some("Base"));
    }

    #[test]
    fn test_missing_primary_key_is_configuration_error() {
        let err = extract_fields(&EntityDecl::new("Base").table("base")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("primary key"));
    }

    #[test]
    fn test_extract_marks_pk_and_appends_timestamps() {
        let fields = extract_fields(&meter()).unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["id", "name", "type", "status", "site_id", "created_at", "updated_at"]
        );
        let pk = &fields[0];
        assert!(pk.primary_key && pk.read_only);
        assert_eq!(pk.column, "meter_id");
        assert!(fields[6].timestamp && fields[6].read_only);
        assert_eq!(fields[6].logical_type, LogicalType::Date);
        assert_eq!(fields[3].default, Some(Value::from("active")));
    }

    #[test]
    fn test_pk_synthesized_when_undeclared() {
        let fields = extract_fields(&site()).unwrap();
        assert_eq!(fields[0].name, "id");
        assert!(fields[0].primary_key);
        assert_eq!(fields[0].logical_type, LogicalType::Number);
    }

    #[test]
    fn test_schema_column_and_type_win() {
        let decl = EntityDecl::new("Contact")
            .table("contact")
            .primary_key("id")
            .field(FieldDecl::typed("id", LogicalType::String).column("id"))
            .field(FieldDecl::new("email").required(false))
            .schema(
                FormSchema::new()
                    .field(SchemaField::new("id").db_field("contact_id").logical_type(LogicalType::Number))
                    .field(SchemaField::new("email").required(true))
                    .field(SchemaField::new("phone").db_field("phone_number")),
            );
        let fields = extract_fields(&decl).unwrap();
        assert_eq!(fields[0].column, "contact_id");
        assert_eq!(fields[0].logical_type, LogicalType::Number);
        assert!(fields[1].required);
        assert_eq!(fields[2].name, "phone");
        assert_eq!(fields[2].column, "phone_number");
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let decl = site().field(FieldDecl::new("name"));
        assert_eq!(extract_fields(&decl).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_invalid_column_rejected() {
        let decl = site().field(FieldDecl::new("x").column("x; DROP TABLE"));
        assert_eq!(extract_fields(&decl).unwrap_err().kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_registry_resolves_default_keys() {
        let registry = Registry::builder()
            .register(meter())
            .register(site())
            .register(reading())
            .build()
            .unwrap();
        let meter = registry.get("Meter").unwrap();
        let site = meter.relationship("site").unwrap();
        assert_eq!(site.local_key, "site_id");
        assert_eq!(site.remote_key, "id");
        let readings = meter.relationship("readings").unwrap();
        assert_eq!(readings.foreign_key, "meter_id");
        assert_eq!(readings.local_key, "meter_id");
        assert_eq!(readings.remote_key, "meter_id");
        assert_eq!(readings.target_table, "readings");
    }

    #[test]
    fn test_registry_unknown_target_fails_at_build() {
        let err = Registry::builder()
            .register(site().relationship(RelationshipDecl::has_many("meters", "Metre")))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("unknown entity 'Metre'"));
    }

    #[test]
    fn test_belongs_to_key_must_be_an_owner_field() {
        let meter = EntityDecl::new("Meter")
            .table("meters")
            .primary_key("id")
            .field(FieldDecl::new("name"))
            .relationship(RelationshipDecl::belongs_to("site", "Site"));
        let err = Registry::builder().register(meter).register(site()).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("key 'site_id', which is not a field of 'Meter'"));
        assert_eq!(err.details().entity.as_deref(), Some("Meter"));
        assert_eq!(err.details().field.as_deref(), Some("site_id"));
        assert_eq!(err.details().available, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_has_many_key_must_be_a_target_field() {
        let orphan = EntityDecl::new("Reading")
            .table("readings")
            .primary_key("id")
            .field(FieldDecl::typed("value", LogicalType::Number));
        let err = Registry::builder()
            .register(site().relationship(RelationshipDecl::has_many("readings", "Reading")))
            .register(orphan)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("key 'site_id', which is not a field of 'Reading'"));
        assert_eq!(err.details().table.as_deref(), Some("readings"));
    }

    #[test]
    fn test_has_one_target_key_must_be_an_owner_field() {
        let err = Registry::builder()
            .register(meter().relationship(RelationshipDecl::has_one("calibration", "Reading").target_key("serial")))
            .register(site())
            .register(reading())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("key 'serial', which is not a field of 'Meter'"));
    }

    #[test]
    fn test_unknown_relationship_lists_available() {
        let registry = Registry::builder()
            .register(meter())
            .register(site())
            .register(reading())
            .build()
            .unwrap();
        let err = registry.get("Meter").unwrap().relationship("owner").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.details().available, vec!["site".to_string(), "readings".to_string()]);
        assert!(err.message().contains("site, readings"));
    }

    #[test]
    fn test_fields_cache_returns_same_allocation() {
        let registry = Registry::builder().register(site()).build().unwrap();
        let a = registry.fields("Site").unwrap();
        let b = registry.fields("Site").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_many_to_many_defaults() {
        let tag = EntityDecl::new("Tag").table("tags").primary_key("id").field(FieldDecl::new("label"));
        let registry = Registry::builder()
            .register(site().relationship(RelationshipDecl::many_to_many("tags", "Tag", "site_tags")))
            .register(tag)
            .build()
            .unwrap();
        let rel = registry.get("Site").unwrap().relationship("tags").unwrap().clone();
        let link = rel.link.unwrap();
        assert_eq!(link.table, "site_tags");
        assert_eq!(link.local_column, "site_id");
        assert_eq!(link.remote_column, "tag_id");
        assert_eq!(rel.local_key, "id");
        assert_eq!(rel.remote_key, "id");
    }

    #[test]
    fn test_selected_columns_always_include_keys() {
        let registry = Registry::builder()
            .register(meter())
            .register(site().relationship(RelationshipDecl::has_many("meters", "Meter").foreign_key("site_id").select(["name"])))
            .register(reading())
            .build()
            .unwrap();
        let rel = registry.get("Site").unwrap().relationship("meters").unwrap();
        assert!(rel.selected_columns.contains(&"meter_id".to_string()));
        assert!(rel.selected_columns.contains(&"site_id".to_string()));
        assert!(rel.selected_columns.contains(&"name".to_string()));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let err = Registry::builder().register(site()).register(site()).build().unwrap_err();
        assert!(err.message().contains("registered twice"));
    }
}
