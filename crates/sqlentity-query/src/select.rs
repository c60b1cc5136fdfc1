//! SELECT construction: query specifications, eager JOINs and related-row
//! lookups for batch loading.
//!
//! Statement structure is always: columns, JOINs, WHERE, ORDER BY, LIMIT,
//! OFFSET. JOIN scopes are numbered before the WHERE clause, matching their
//! position in the text.
//!
//! Joined relationship columns come back aliased `"<relationship>.<column>"`;
//! the [`RelationshipMap`] returned with the statement tells the
//! [mapper](crate::mapper) how to unpack them.

use sqlentity_core::{
    Entity, Error, ErrorKind, FieldDescriptor, Filter, OrderBy, Registry, Relationship,
    RelationshipKind, Result, Value, find_field,
};

use crate::clause::{Statement, build_where, placeholder, qualify};

/// Column alias carrying the owning key in many-to-many lookups.
pub const PARENT_KEY_ALIAS: &str = "__parent_key";

/// A relationship to include, with optional nested includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub name: String,
    pub nested: Vec<Include>,
}

impl Include {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: Vec::new(),
        }
    }

    /// Add a nested include resolved on the related entity.
    #[must_use]
    pub fn with(mut self, nested: impl Into<Include>) -> Self {
        self.nested.push(nested.into());
        self
    }
}

impl From<&str> for Include {
    fn from(name: &str) -> Self {
        Include::new(name)
    }
}

impl From<String> for Include {
    fn from(name: String) -> Self {
        Include::new(name)
    }
}

/// Per-call query specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub include: Vec<Include>,
    /// Fields to select (empty = all). The primary key is always selected.
    pub columns: Vec<String>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn include(mut self, include: impl Into<Include>) -> Self {
        self.include.push(include.into());
        self
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// One eagerly joined relationship, as the mapper needs to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRelation {
    /// Relationship name; also the column-alias prefix.
    pub name: String,
    pub kind: RelationshipKind,
    /// Related primary-key column; `NULL` there means "no related row".
    pub pk_column: String,
    /// Related columns selected, in order.
    pub columns: Vec<String>,
}

impl JoinedRelation {
    /// Column alias for a related column.
    #[must_use]
    pub fn alias_for(&self, column: &str) -> String {
        format!("{}.{column}", self.name)
    }

    /// SQL alias of the joined table.
    #[must_use]
    pub fn table_alias(&self) -> String {
        join_alias(&self.name)
    }
}

/// Relationships joined into a SELECT, in join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipMap {
    pub relations: Vec<JoinedRelation>,
}

impl RelationshipMap {
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// True if a column name belongs to some joined relationship.
    pub fn owns_column(&self, column: &str) -> bool {
        self.relations.iter().any(|r| {
            column
                .strip_prefix(r.name.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// A SELECT plus the relationship map needed to unpack its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub statement: Statement,
    pub relationships: RelationshipMap,
}

/// SQL alias of a joined relationship table.
#[must_use]
pub fn join_alias(relationship: &str) -> String {
    format!("rel_{relationship}")
}

/// SELECT builder for one entity.
#[derive(Debug)]
pub struct SelectBuilder<'a> {
    registry: &'a Registry,
    entity: &'a Entity,
    spec: &'a QuerySpec,
    joins: Vec<&'a Relationship>,
}

impl<'a> SelectBuilder<'a> {
    pub fn new(registry: &'a Registry, entity: &'a Entity, spec: &'a QuerySpec) -> Self {
        Self {
            registry,
            entity,
            spec,
            joins: Vec::new(),
        }
    }

    /// Eagerly join a relationship (by name or alias).
    pub fn join(mut self, relationship: &str) -> Result<Self> {
        let rel = self.entity.relationship(relationship)?;
        if !self.joins.iter().any(|r| r.name == rel.name) {
            self.joins.push(rel);
        }
        Ok(self)
    }

    pub fn build(&self) -> Result<SelectStatement> {
        let table = self.entity.table();
        let fields: &[FieldDescriptor] = self.entity.fields();

        let mut select_list = self.base_columns(fields)?;
        let mut joins_sql = String::new();
        let mut params: Vec<Value> = Vec::new();
        let mut map = RelationshipMap::default();
        let mut join_order: Vec<String> = Vec::new();

        for rel in &self.joins {
            let target = self.registry.get(&rel.target)?;
            let alias = join_alias(&rel.name);
            let columns = related_columns(rel, target);

            match &rel.link {
                Some(link) => {
                    let link_alias = format!("{alias}_link");
                    joins_sql.push_str(&format!(
                        " LEFT JOIN {} {link_alias} ON {link_alias}.{} = {table}.{}",
                        link.table, link.local_column, rel.local_key
                    ));
                    joins_sql.push_str(&format!(
                        " LEFT JOIN {} {alias} ON {alias}.{} = {link_alias}.{}",
                        rel.target_table, rel.remote_key, link.remote_column
                    ));
                }
                None => {
                    joins_sql.push_str(&format!(
                        " LEFT JOIN {} {alias} ON {alias}.{} = {table}.{}",
                        rel.target_table, rel.remote_key, rel.local_key
                    ));
                }
            }
            let scope = build_where(&rel.extra_filters, Some(alias.as_str()), params.len() + 1, Some(&target.fields()[..]))?;
            if !scope.is_empty() {
                joins_sql.push_str(&format!(" AND {}", scope.sql));
                params.extend(scope.params);
            }

            for column in &columns {
                select_list.push(format!("{alias}.{column} AS \"{}.{column}\"", rel.name));
            }
            if rel.is_to_many() {
                join_order.extend(
                    rel.order_by
                        .iter()
                        .map(|o| format!("{alias}.{} {}", o.field, o.direction.as_sql())),
                );
            }
            map.relations.push(JoinedRelation {
                name: rel.name.clone(),
                kind: rel.kind,
                pk_column: target.primary_key_column().to_string(),
                columns,
            });
        }

        let fragment = build_where(&self.spec.filter, Some(table), params.len() + 1, Some(fields))?;
        params.extend(fragment.params);

        let mut sql = format!("SELECT {} FROM {table}{joins_sql}", select_list.join(", "));
        if !fragment.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&fragment.sql);
        }
        let mut order = order_terms(&self.spec.order_by, table, fields)?;
        if !join_order.is_empty() {
            // Keep parents contiguous before ordering their joined children.
            let pk = format!("{table}.{}", self.entity.primary_key_column());
            if !order.iter().any(|o| o.starts_with(&pk)) {
                order.push(format!("{pk} ASC"));
            }
            order.extend(join_order);
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = self.spec.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.spec.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
        tracing::trace!(table, joins = map.len(), params = params.len(), "Built SELECT");

        Ok(SelectStatement {
            statement: Statement::new(sql, params),
            relationships: map,
        })
    }

    fn base_columns(&self, fields: &[FieldDescriptor]) -> Result<Vec<String>> {
        let table = self.entity.table();
        if self.spec.columns.is_empty() {
            return Ok(vec![format!("{table}.*")]);
        }
        let pk = self.entity.primary_key_column();
        let mut columns = vec![pk.to_string()];
        for key in &self.spec.columns {
            let field = find_field(fields, key)
                .ok_or_else(|| Error::validation(key.clone(), format!("unknown field '{key}' in column list")))?;
            if !columns.contains(&field.column) {
                columns.push(field.column.clone());
            }
        }
        // Keys needed to resolve joined to-one relationships.
        for rel in &self.joins {
            if rel.kind == RelationshipKind::BelongsTo && !columns.contains(&rel.local_key) {
                columns.push(rel.local_key.clone());
            }
        }
        Ok(columns.into_iter().map(|c| format!("{table}.{c}")).collect())
    }
}

/// Builds the follow-up SELECT that loads related rows for a set of owner keys.
///
/// For `belongsTo`, `hasOne` and `hasMany` the related table is filtered on its
/// matching key. For many-to-many the junction is joined and its owner column
/// is returned as [`PARENT_KEY_ALIAS`] so rows can be grouped per owner.
#[derive(Debug)]
pub struct RelatedSelectBuilder<'a> {
    relationship: &'a Relationship,
    target: &'a Entity,
    keys: &'a [Value],
    limit: Option<u64>,
}

impl<'a> RelatedSelectBuilder<'a> {
    pub fn new(relationship: &'a Relationship, target: &'a Entity, keys: &'a [Value]) -> Self {
        Self {
            relationship,
            target,
            keys,
            limit: None,
        }
    }

    /// Cap the number of rows (single-owner loads only).
    #[must_use]
    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Build the lookup, or `None` when there are no keys to look up.
    pub fn build(&self) -> Result<Option<Statement>> {
        if self.keys.is_empty() {
            return Ok(None);
        }
        let rel = self.relationship;
        let table = self.target.table();
        let mut select_list: Vec<String> = if rel.selected_columns.is_empty() {
            vec![format!("{table}.*")]
        } else {
            rel.selected_columns.iter().map(|c| format!("{table}.{c}")).collect()
        };

        let holders: Vec<String> = (1..=self.keys.len()).map(placeholder).collect();
        let mut params: Vec<Value> = self.keys.to_vec();
        let (from, key_condition) = match &rel.link {
            Some(link) => {
                select_list.push(format!("{}.{} AS {PARENT_KEY_ALIAS}", link.table, link.local_column));
                (
                    format!(
                        "{table} INNER JOIN {} ON {}.{} = {table}.{}",
                        link.table, link.table, link.remote_column, rel.remote_key
                    ),
                    format!("{}.{} IN ({})", link.table, link.local_column, holders.join(", ")),
                )
            }
            None => (
                table.to_string(),
                format!("{table}.{} IN ({})", rel.remote_key, holders.join(", ")),
            ),
        };

        let scope = build_where(&rel.extra_filters, Some(table), params.len() + 1, Some(&self.target.fields()[..]))?;
        params.extend(scope.params);

        let mut sql = format!("SELECT {} FROM {from} WHERE {key_condition}", select_list.join(", "));
        if !scope.sql.is_empty() {
            sql.push_str(" AND ");
            sql.push_str(&scope.sql);
        }
        if !rel.order_by.is_empty() {
            let order: Vec<String> = rel
                .order_by
                .iter()
                .map(|o| format!("{table}.{} {}", o.field, o.direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        Ok(Some(Statement::new(sql, params)))
    }
}

fn related_columns(rel: &Relationship, target: &Entity) -> Vec<String> {
    if rel.selected_columns.is_empty() {
        target.fields().iter().map(|f| f.column.clone()).collect()
    } else {
        rel.selected_columns.clone()
    }
}

fn order_terms(order_by: &[OrderBy], alias: &str, fields: &[FieldDescriptor]) -> Result<Vec<String>> {
    order_by
        .iter()
        .map(|o| {
            let field = find_field(fields, &o.field).ok_or_else(|| {
                let mut err = Error::new(ErrorKind::Validation, format!("unknown field '{}' in order by", o.field));
                err.details_mut().field = Some(o.field.clone());
                err
            })?;
            Ok(format!("{} {}", qualify(Some(alias), &field.column), o.direction.as_sql()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlentity_core::{EntityDecl, FieldDecl, LogicalType, Operator, RelationshipDecl};

    fn registry() -> Registry {
        Registry::builder()
            .register(
                EntityDecl::new("Meter")
                    .table("meters")
                    .primary_key("id")
                    .field(FieldDecl::typed("id", LogicalType::Number).column("meter_id"))
                    .field(FieldDecl::new("name"))
                    .field(FieldDecl::typed("site_id", LogicalType::Number))
                    .relationship(RelationshipDecl::belongs_to("site", "Site"))
                    .relationship(
                        RelationshipDecl::has_many("readings", "Reading")
                            .order_by(OrderBy::desc("taken_at"))
                            .filter(Filter::new().with("valid", true)),
                    )
                    .relationship(RelationshipDecl::many_to_many("tags", "Tag", "meter_tags")),
            )
            .register(
                EntityDecl::new("Site")
                    .table("sites")
                    .primary_key("id")
                    .field(FieldDecl::new("name")),
            )
            .register(
                EntityDecl::new("Reading")
                    .table("readings")
                    .primary_key("id")
                    .field(FieldDecl::typed("meter_id", LogicalType::Number))
                    .field(FieldDecl::typed("value", LogicalType::Number))
                    .field(FieldDecl::typed("valid", LogicalType::Boolean))
                    .field(FieldDecl::typed("taken_at", LogicalType::Date)),
            )
            .register(
                EntityDecl::new("Tag")
                    .table("tags")
                    .primary_key("id")
                    .field(FieldDecl::new("label")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_plain_select_structure() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new()
            .filter(Filter::eq("name", "Acme"))
            .order_by(OrderBy::asc("name"))
            .limit(10)
            .offset(20);
        let select = SelectBuilder::new(&registry, meter, &spec).build().unwrap();
        assert_eq!(
            select.statement.sql,
            "SELECT meters.* FROM meters WHERE meters.name = $1 ORDER BY meters.name ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(select.statement.params, vec![Value::from("Acme")]);
        assert!(select.relationships.is_empty());
    }

    #[test]
    fn test_belongs_to_join_aliases_related_columns() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new().filter(Filter::eq("id", 3));
        let select = SelectBuilder::new(&registry, meter, &spec)
            .join("site")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            select.statement.sql,
            "SELECT meters.*, rel_site.id AS \"site.id\", rel_site.name AS \"site.name\" \
             FROM meters LEFT JOIN sites rel_site ON rel_site.id = meters.site_id \
             WHERE meters.meter_id = $1"
        );
        assert_eq!(select.relationships.relations[0].pk_column, "id");
    }

    #[test]
    fn test_join_scope_params_numbered_before_where() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new().filter(Filter::eq("id", 3));
        let select = SelectBuilder::new(&registry, meter, &spec)
            .join("readings")
            .unwrap()
            .build()
            .unwrap();
        let sql = &select.statement.sql;
        assert!(sql.contains(
            "LEFT JOIN readings rel_readings ON rel_readings.meter_id = meters.meter_id AND rel_readings.valid = $1"
        ));
        assert!(sql.contains("WHERE meters.meter_id = $2"));
        assert!(sql.ends_with("ORDER BY meters.meter_id ASC, rel_readings.taken_at DESC"));
        assert_eq!(select.statement.params, vec![Value::Bool(true), Value::BigInt(3)]);
    }

    #[test]
    fn test_many_to_many_join_goes_through_link() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new();
        let select = SelectBuilder::new(&registry, meter, &spec)
            .join("tags")
            .unwrap()
            .build()
            .unwrap();
        assert!(select.statement.sql.contains(
            "LEFT JOIN meter_tags rel_tags_link ON rel_tags_link.meter_id = meters.meter_id \
             LEFT JOIN tags rel_tags ON rel_tags.id = rel_tags_link.tag_id"
        ));
    }

    #[test]
    fn test_unknown_join_is_configuration_error() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new();
        let err = SelectBuilder::new(&registry, meter, &spec).join("owner").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_narrowed_columns_always_include_pk() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new().columns(["name"]);
        let select = SelectBuilder::new(&registry, meter, &spec).build().unwrap();
        assert_eq!(select.statement.sql, "SELECT meters.meter_id, meters.name FROM meters");
    }

    #[test]
    fn test_unknown_order_field_rejected() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new().order_by(OrderBy::asc("colour"));
        let err = SelectBuilder::new(&registry, meter, &spec).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_related_select_for_has_many_keys() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let rel = meter.relationship("readings").unwrap();
        let target = registry.get("Reading").unwrap();
        let keys = vec![Value::BigInt(1), Value::BigInt(2)];
        let stmt = RelatedSelectBuilder::new(rel, target, &keys).build().unwrap().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT readings.* FROM readings WHERE readings.meter_id IN ($1, $2) \
             AND readings.valid = $3 ORDER BY readings.taken_at DESC"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_related_select_many_to_many_carries_parent_key() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let rel = meter.relationship("tags").unwrap();
        let target = registry.get("Tag").unwrap();
        let keys = vec![Value::BigInt(1)];
        let stmt = RelatedSelectBuilder::new(rel, target, &keys).build().unwrap().unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT tags.*, meter_tags.meter_id AS __parent_key FROM tags \
             INNER JOIN meter_tags ON meter_tags.tag_id = tags.id WHERE meter_tags.meter_id IN ($1)"
        );
    }

    #[test]
    fn test_related_select_without_keys_is_none() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let rel = meter.relationship("site").unwrap();
        let target = registry.get("Site").unwrap();
        assert!(RelatedSelectBuilder::new(rel, target, &[]).build().unwrap().is_none());
    }

    #[test]
    fn test_filter_in_empty_in_select() {
        let registry = registry();
        let meter = registry.get("Meter").unwrap();
        let spec = QuerySpec::new().filter(Filter::new().with("id", Operator::In(vec![])));
        let select = SelectBuilder::new(&registry, meter, &spec).build().unwrap();
        assert_eq!(select.statement.sql, "SELECT meters.* FROM meters WHERE 1 = 0");
        assert!(select.statement.params.is_empty());
    }

    #[test]
    fn test_relationship_map_owns_prefixed_columns() {
        let map = RelationshipMap {
            relations: vec![JoinedRelation {
                name: "site".into(),
                kind: RelationshipKind::BelongsTo,
                pk_column: "id".into(),
                columns: vec!["id".into()],
            }],
        };
        assert!(map.owns_column("site.id"));
        assert!(!map.owns_column("site_id"));
        assert!(!map.owns_column("sites.id"));
    }
}
