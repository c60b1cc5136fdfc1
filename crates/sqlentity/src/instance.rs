//! Materialized entity records.
//!
//! An [`Instance`] holds field values keyed by field name (never by storage
//! column), the relationships that have been loaded for it, and a handle back to
//! its [`Orm`] so it can update, delete, save and reload itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlentity_core::codec::{deserialize, validate_type};
use sqlentity_core::{
    Data, Entity, Error, ErrorDetails, ErrorKind, Executor, Filter, Operation, Result, Row, Value,
    find_by_column,
};
use sqlentity_query::{DeleteBuilder, QuerySpec, SelectBuilder, UpdateBuilder};

use crate::exec::{Target, run};
use crate::model::{Orm, insert_instance};

/// Loaded relationship data.
#[derive(Debug, Clone)]
pub enum Related {
    /// `belongsTo` / `hasOne`.
    One(Option<Box<Instance>>),
    /// `hasMany` / `manyToMany`, in query order.
    Many(Vec<Instance>),
}

impl Related {
    pub(crate) fn empty(to_many: bool) -> Self {
        if to_many {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        }
    }

    pub(crate) fn from_instances(to_many: bool, instances: Vec<Instance>) -> Self {
        if to_many {
            Related::Many(instances)
        } else {
            Related::One(instances.into_iter().next().map(Box::new))
        }
    }

    pub(crate) fn into_instances(self) -> Vec<Instance> {
        match self {
            Related::One(one) => one.map(|b| vec![*b]).unwrap_or_default(),
            Related::Many(many) => many,
        }
    }

    pub fn as_one(&self) -> Option<&Instance> {
        match self {
            Related::One(one) => one.as_deref(),
            Related::Many(_) => None,
        }
    }

    pub fn as_many(&self) -> &[Instance] {
        match self {
            Related::Many(many) => many,
            Related::One(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Related::One(one) => usize::from(one.is_some()),
            Related::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Related::One(None) => serde_json::Value::Null,
            Related::One(Some(one)) => one.to_json(),
            Related::Many(many) => serde_json::Value::Array(many.iter().map(Instance::to_json).collect()),
        }
    }
}

/// One record of an entity.
#[derive(Debug, Clone)]
pub struct Instance {
    orm: Orm,
    entity: Arc<Entity>,
    values: Data,
    related: BTreeMap<String, Related>,
    persisted: bool,
}

impl Instance {
    pub(crate) fn new(orm: Orm, entity: Arc<Entity>, values: Data) -> Self {
        Self {
            orm,
            entity,
            values,
            related: BTreeMap::new(),
            persisted: false,
        }
    }

    /// Build a persisted instance from a storage row.
    ///
    /// Columns are mapped back to field names and decoded through the type
    /// codec; columns that belong to no field are ignored.
    pub(crate) fn from_row(orm: &Orm, entity: &Arc<Entity>, row: &Row) -> Result<Self> {
        let mut instance = Self::new(orm.clone(), Arc::clone(entity), Data::new());
        instance.absorb(row)?;
        instance.persisted = true;
        Ok(instance)
    }

    fn absorb(&mut self, row: &Row) -> Result<()> {
        for (column, value) in row.iter() {
            if let Some(field) = find_by_column(self.entity.fields(), column) {
                let decoded = deserialize(value, field.logical_type, &field.name)?;
                self.values.insert(field.name.clone(), decoded);
            }
        }
        Ok(())
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Field value by field name or storage column.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let field = self.entity.field(key)?;
        self.values.get(&field.name)
    }

    /// Set a field value in memory; nothing is written until `save`.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let Some(field) = self.entity.field(key) else {
            return Err(Error::validation(key, format!("unknown field '{key}' on {}", self.entity.name())));
        };
        self.values.insert(field.name.clone(), value.into());
        Ok(())
    }

    /// All field values, keyed by field name.
    pub fn values(&self) -> &Data {
        &self.values
    }

    /// The primary-key value, if set and not null.
    pub fn primary_key(&self) -> Option<&Value> {
        self.values.get(self.entity.primary_key()).filter(|v| !v.is_null())
    }

    /// True once the instance was read from or written to storage.
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// A loaded relationship, by name or alias.
    pub fn related(&self, name: &str) -> Option<&Related> {
        let rel = self.entity.relationship(name).ok()?;
        self.related.get(&rel.name)
    }

    pub(crate) fn has_related(&self, name: &str) -> bool {
        self.related.contains_key(name)
    }

    pub(crate) fn set_related(&mut self, name: &str, related: Related) {
        self.related.insert(name.to_string(), related);
    }

    pub(crate) fn take_related(&mut self, name: &str) -> Option<Related> {
        self.related.remove(name)
    }

    /// Plain JSON: fields in declaration order, then loaded relationships under
    /// their attach names.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for field in self.entity.fields().iter() {
            if let Some(value) = self.values.get(&field.name) {
                map.insert(field.name.clone(), value.to_json());
            }
        }
        for rel in self.entity.relationships() {
            if let Some(related) = self.related.get(&rel.name) {
                map.insert(rel.attach_as().to_string(), related.to_json());
            }
        }
        serde_json::Value::Object(map)
    }

    fn missing_key(&self, action: &str) -> Error {
        Error::not_found(
            self.entity.name(),
            format!("cannot {action} {}: instance has no primary key", self.entity.name()),
        )
    }

    fn vanished(&self, pk: &Value) -> Error {
        Error::not_found(self.entity.name(), format!("{} {pk} not found", self.entity.name())).with_details(
            ErrorDetails {
                entity: Some(self.entity.name().to_string()),
                table: Some(self.entity.table().to_string()),
                field: Some(self.entity.primary_key().to_string()),
                value: Some(pk.to_string()),
                ..ErrorDetails::default()
            },
        )
    }

    /// Write `data` and refresh this instance from the returned row.
    ///
    /// Only writable fields are sent; if none remain no statement is issued.
    #[tracing::instrument(level = "debug", skip(self, cx, db, data), fields(entity = %self.entity.name()))]
    pub async fn update<E: Executor + ?Sized>(&mut self, cx: &Cx, db: &E, data: Data) -> Outcome<(), Error> {
        let Some(pk) = self.primary_key().cloned() else {
            return Outcome::Err(self.missing_key("update"));
        };
        let data = try_result!(prepare_update(&self.entity, data));

        let entity = Arc::clone(&self.entity);
        let touch = entity.timestamps().map(|t| t.updated_at.as_str());
        let built = UpdateBuilder::new(entity.table(), entity.fields(), &data)
            .filter(Filter::eq(entity.primary_key(), pk.clone()))
            .touch(touch)
            .build();
        let Some(statement) = try_result!(built) else {
            tracing::debug!("Nothing to update");
            return Outcome::Ok(());
        };

        let target = Target::new(Operation::Update, entity.name(), entity.table());
        let result = try_outcome!(run(cx, db, self.orm.config(), &statement, target).await);
        let Some(row) = result.rows.first() else {
            return Outcome::Err(self.vanished(&pk));
        };
        try_result!(self.absorb(row));
        self.persisted = true;
        Outcome::Ok(())
    }

    /// Delete this record; returns the deleted row's data.
    #[tracing::instrument(level = "debug", skip(self, cx, db), fields(entity = %self.entity.name()))]
    pub async fn delete<E: Executor + ?Sized>(&mut self, cx: &Cx, db: &E) -> Outcome<Data, Error> {
        let Some(pk) = self.primary_key().cloned() else {
            return Outcome::Err(self.missing_key("delete"));
        };
        let entity = Arc::clone(&self.entity);
        let statement = try_result!(
            DeleteBuilder::new(entity.table(), entity.fields())
                .filter(Filter::eq(entity.primary_key(), pk.clone()))
                .build()
        );
        let target = Target::new(Operation::Delete, entity.name(), entity.table());
        let result = try_outcome!(run(cx, db, self.orm.config(), &statement, target).await);
        let Some(row) = result.rows.first() else {
            return Outcome::Err(self.vanished(&pk));
        };
        let deleted = try_result!(Instance::from_row(&self.orm, &entity, row));
        self.persisted = false;
        Outcome::Ok(deleted.values)
    }

    /// Insert when no primary key is set, otherwise update with every field.
    #[tracing::instrument(level = "debug", skip(self, cx, db), fields(entity = %self.entity.name()))]
    pub async fn save<E: Executor + ?Sized>(&mut self, cx: &Cx, db: &E) -> Outcome<(), Error> {
        if self.primary_key().is_some() {
            let data = self.values.clone();
            return self.update(cx, db, data).await;
        }
        let created = try_outcome!(insert_instance(cx, db, &self.orm, &self.entity, self.values.clone()).await);
        self.values = created.values;
        self.persisted = true;
        Outcome::Ok(())
    }

    /// Re-read every field from storage by primary key.
    #[tracing::instrument(level = "debug", skip(self, cx, db), fields(entity = %self.entity.name()))]
    pub async fn reload<E: Executor + ?Sized>(&mut self, cx: &Cx, db: &E) -> Outcome<(), Error> {
        let Some(pk) = self.primary_key().cloned() else {
            return Outcome::Err(self.missing_key("reload"));
        };
        let entity = Arc::clone(&self.entity);
        let spec = QuerySpec::new().filter(Filter::eq(entity.primary_key(), pk.clone()));
        let select = try_result!(SelectBuilder::new(self.orm.registry(), &entity, &spec).build());
        let target = Target::new(Operation::Read, entity.name(), entity.table());
        let result = try_outcome!(run(cx, db, self.orm.config(), &select.statement, target).await);
        let Some(row) = result.rows.first() else {
            return Outcome::Err(self.vanished(&pk));
        };
        try_result!(self.absorb(row));
        self.persisted = true;
        Outcome::Ok(())
    }
}

/// Rekey `data` by field name and type-check every supplied value.
fn normalize(entity: &Entity, data: Data) -> Result<Data> {
    let mut normalized = Data::new();
    for (key, value) in data {
        let Some(field) = entity.field(&key) else {
            let mut err = Error::validation(key.clone(), format!("unknown field '{key}' on {}", entity.name()));
            err.details_mut().entity = Some(entity.name().to_string());
            return Err(err);
        };
        validate_type(&value, field.logical_type, &field.name).map_err(|e| e.in_entity(entity.name()))?;
        normalized.insert(field.name.clone(), value);
    }
    Ok(normalized)
}

fn required_error(entity: &Entity, field: &str) -> Error {
    let mut err = Error::new(ErrorKind::Validation, format!("{field} is required"));
    let details = err.details_mut();
    details.field = Some(field.to_string());
    details.entity = Some(entity.name().to_string());
    err
}

/// Checks run before an INSERT: known fields, types, defaults, required fields.
pub(crate) fn prepare_insert(entity: &Entity, data: Data) -> Result<Data> {
    let mut data = normalize(entity, data)?;
    for field in entity.fields().iter() {
        if let Some(default) = &field.default {
            data.entry(field.name.clone()).or_insert_with(|| default.clone());
        }
        let missing = data.get(&field.name).is_none_or(Value::is_null);
        if field.required && !field.primary_key && !field.timestamp && missing {
            return Err(required_error(entity, &field.name));
        }
    }
    Ok(data)
}

/// Checks run before an UPDATE: known fields, types, no nulled required fields.
pub(crate) fn prepare_update(entity: &Entity, data: Data) -> Result<Data> {
    let data = normalize(entity, data)?;
    for (name, value) in &data {
        let required = entity.field(name).is_some_and(|f| f.required && f.is_writable());
        if required && value.is_null() {
            return Err(required_error(entity, name));
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlentity_core::{EntityDecl, FieldDecl, LogicalType, Registry};

    fn entity() -> Arc<Entity> {
        let registry = Registry::builder()
            .register(
                EntityDecl::new("Meter")
                    .table("meters")
                    .primary_key("id")
                    .timestamps(true)
                    .field(FieldDecl::typed("id", LogicalType::Number).column("meter_id"))
                    .field(FieldDecl::new("name").required(true))
                    .field(FieldDecl::new("status").default_value("active"))
                    .field(FieldDecl::typed("reading", LogicalType::Number)),
            )
            .build()
            .unwrap();
        Arc::clone(registry.get("Meter").unwrap())
    }

    fn data(pairs: &[(&str, Value)]) -> Data {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_prepare_insert_applies_defaults() {
        let prepared = prepare_insert(&entity(), data(&[("name", "Acme".into())])).unwrap();
        assert_eq!(prepared.get("status"), Some(&Value::from("active")));
    }

    #[test]
    fn test_prepare_insert_requires_fields() {
        let err = prepare_insert(&entity(), data(&[("reading", 3.into())])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.message(), "name is required");
        assert_eq!(err.details().field.as_deref(), Some("name"));
    }

    #[test]
    fn test_prepare_rejects_type_mismatch() {
        let err = prepare_insert(&entity(), data(&[("name", "Acme".into()), ("reading", "lots".into())]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.details().field.as_deref(), Some("reading"));
    }

    #[test]
    fn test_prepare_rekeys_columns_to_field_names() {
        let prepared = prepare_update(&entity(), data(&[("meter_id", 4.into())])).unwrap();
        assert!(prepared.contains_key("id"));
    }

    #[test]
    fn test_prepare_update_rejects_nulling_required_field() {
        let err = prepare_update(&entity(), data(&[("name", Value::Null)])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_from_row_maps_columns_to_fields() {
        let orm = Orm::new(
            Registry::builder()
                .register(EntityDecl::new("Meter").table("meters").primary_key("id"))
                .build()
                .unwrap(),
        );
        let entity = entity();
        let row = Row::from_pairs([
            ("meter_id", Value::BigInt(7)),
            ("name", Value::from("Acme")),
            ("created_at", Value::from("2024-03-01T10:00:00Z")),
            ("__parent_key", Value::BigInt(1)),
        ]);
        let instance = Instance::from_row(&orm, &entity, &row).unwrap();
        assert!(instance.is_persisted());
        assert_eq!(instance.primary_key(), Some(&Value::BigInt(7)));
        assert_eq!(instance.get("meter_id"), Some(&Value::BigInt(7)));
        assert!(instance.get("created_at").unwrap().as_timestamp().is_some());
        assert_eq!(instance.values().len(), 3);
        assert_eq!(instance.to_json()["name"], serde_json::json!("Acme"));
    }

    #[test]
    fn test_related_shapes() {
        let one = Related::from_instances(false, Vec::new());
        assert!(one.is_empty());
        assert_eq!(one.to_json(), serde_json::Value::Null);
        let many = Related::empty(true);
        assert_eq!(many.to_json(), serde_json::json!([]));
        assert!(many.as_one().is_none());
    }
}
