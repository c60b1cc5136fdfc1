//! The model facade: entity-scoped operations over a storage client.

use std::sync::Arc;

use asupersync::{Cx, Outcome};
use serde::Serialize;
use sqlentity_core::{
    Data, Entity, Error, ErrorKind, Executor, Filter, Operation, Registry, RelationshipKind, Result,
};
use sqlentity_query::{
    CountBuilder, ExistsBuilder, Include, InsertBuilder, QuerySpec, RelatedRows, SelectBuilder,
    count_from, map_joined_rows,
};

use crate::config::OrmConfig;
use crate::exec::{Target, run};
use crate::instance::{Instance, Related, prepare_insert};
use crate::resolver;

#[derive(Debug)]
struct OrmInner {
    registry: Registry,
    config: OrmConfig,
}

/// Entry point: a validated registry plus runtime configuration.
///
/// Cloning is cheap; clones share the registry.
#[derive(Debug, Clone)]
pub struct Orm {
    inner: Arc<OrmInner>,
}

impl Orm {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, OrmConfig::default())
    }

    pub fn with_config(registry: Registry, config: OrmConfig) -> Self {
        Self {
            inner: Arc::new(OrmInner { registry, config }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn config(&self) -> &OrmConfig {
        &self.inner.config
    }

    /// Facade for one registered entity.
    pub fn model(&self, name: &str) -> Result<Model<'_>> {
        let entity = self.inner.registry.get(name)?;
        Ok(Model { orm: self, entity })
    }
}

/// Pagination metadata for [`Model::find_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub page_size: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl Pagination {
    /// Metadata for a limited query, from the total matching row count.
    pub fn paged(total: u64, limit: u64, offset: u64) -> Self {
        let (total_pages, current_page) = if limit == 0 {
            (0, 1)
        } else {
            (total.div_ceil(limit), offset / limit + 1)
        };
        Self {
            total,
            total_pages,
            current_page,
            page_size: limit,
            has_next_page: current_page < total_pages,
            has_previous_page: current_page > 1,
        }
    }

    /// Metadata for an unlimited query: everything is one page.
    pub fn single(rows: usize) -> Self {
        let total = rows as u64;
        Self {
            total,
            total_pages: 1,
            current_page: 1,
            page_size: total,
            has_next_page: false,
            has_previous_page: false,
        }
    }
}

/// One page of [`Model::find_all`] results.
#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<Instance>,
    pub pagination: Pagination,
}

/// Operations scoped to one entity.
#[derive(Debug, Clone, Copy)]
pub struct Model<'a> {
    orm: &'a Orm,
    entity: &'a Arc<Entity>,
}

impl<'a> Model<'a> {
    pub fn entity(&self) -> &Entity {
        self.entity
    }

    pub fn name(&self) -> &str {
        self.entity.name()
    }

    fn target(&self, operation: Operation) -> Target<'a> {
        Target::new(operation, self.entity.name(), self.entity.table())
    }

    /// An unsaved instance; call [`Instance::save`] to insert it.
    pub fn build(&self, data: Data) -> Instance {
        Instance::new(self.orm.clone(), Arc::clone(self.entity), data)
    }

    /// Validate and insert `data`; returns the stored record.
    #[tracing::instrument(level = "debug", skip(self, cx, db, data), fields(entity = %self.entity.name()))]
    pub async fn create<E: Executor + ?Sized>(&self, cx: &Cx, db: &E, data: Data) -> Outcome<Instance, Error> {
        insert_instance(cx, db, self.orm, self.entity, data).await
    }

    /// Find by primary key. To-many includes are joined here as well.
    #[tracing::instrument(level = "debug", skip(self, cx, db, id, include), fields(entity = %self.entity.name()))]
    pub async fn find_by_id<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        id: impl Into<sqlentity_core::Value>,
        include: &[Include],
    ) -> Outcome<Option<Instance>, Error> {
        let spec = QuerySpec {
            filter: Filter::eq(self.entity.primary_key(), id),
            include: include.to_vec(),
            ..QuerySpec::default()
        };
        let found = try_outcome!(self.select(cx, db, &spec, true).await);
        Outcome::Ok(found.into_iter().next())
    }

    /// First record matching `spec` (`LIMIT 1`).
    #[tracing::instrument(level = "debug", skip(self, cx, db, spec), fields(entity = %self.entity.name()))]
    pub async fn find_one<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        spec: QuerySpec,
    ) -> Outcome<Option<Instance>, Error> {
        let spec = spec.limit(1);
        let found = try_outcome!(self.select(cx, db, &spec, false).await);
        Outcome::Ok(found.into_iter().next())
    }

    /// Records matching `spec`, with pagination metadata.
    ///
    /// The total is counted with a second statement only when `limit` is set;
    /// otherwise it is the number of rows returned.
    #[tracing::instrument(level = "debug", skip(self, cx, db, spec), fields(entity = %self.entity.name()))]
    pub async fn find_all<E: Executor + ?Sized>(&self, cx: &Cx, db: &E, spec: QuerySpec) -> Outcome<Page, Error> {
        let rows = try_outcome!(self.select(cx, db, &spec, false).await);
        let pagination = match spec.limit {
            Some(limit) => {
                let total = try_outcome!(self.count(cx, db, &spec.filter).await);
                Pagination::paged(total, limit, spec.offset.unwrap_or(0))
            }
            None => Pagination::single(rows.len()),
        };
        Outcome::Ok(Page { rows, pagination })
    }

    #[tracing::instrument(level = "debug", skip(self, cx, db, filter), fields(entity = %self.entity.name()))]
    pub async fn count<E: Executor + ?Sized>(&self, cx: &Cx, db: &E, filter: &Filter) -> Outcome<u64, Error> {
        let statement = try_result!(CountBuilder::new(self.entity.table(), self.entity.fields(), filter).build());
        let result = try_outcome!(run(cx, db, self.orm.config(), &statement, self.target(Operation::Count)).await);
        Outcome::Ok(count_from(result.first().and_then(|row| row.get_by_name("count"))))
    }

    #[tracing::instrument(level = "debug", skip(self, cx, db, filter), fields(entity = %self.entity.name()))]
    pub async fn exists<E: Executor + ?Sized>(&self, cx: &Cx, db: &E, filter: &Filter) -> Outcome<bool, Error> {
        let statement = try_result!(ExistsBuilder::new(self.entity.table(), self.entity.fields(), filter).build());
        let result = try_outcome!(run(cx, db, self.orm.config(), &statement, self.target(Operation::Read)).await);
        Outcome::Ok(!result.rows.is_empty())
    }

    /// (Re)load one relationship onto one instance.
    pub async fn load_relationship<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        instance: &mut Instance,
        name: &str,
    ) -> Outcome<(), Error> {
        self.load_relationships_many(cx, db, std::slice::from_mut(instance), &[Include::new(name)])
            .await
    }

    /// (Re)load several relationships, with nested includes, onto one instance.
    pub async fn load_relationships<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        instance: &mut Instance,
        includes: &[Include],
    ) -> Outcome<(), Error> {
        self.load_relationships_many(cx, db, std::slice::from_mut(instance), includes)
            .await
    }

    /// Batch-load one relationship for many instances with a single query.
    pub async fn load_relationship_many<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        instances: &mut [Instance],
        name: &str,
    ) -> Outcome<(), Error> {
        self.load_relationships_many(cx, db, instances, &[Include::new(name)])
            .await
    }

    /// Batch-load several relationships (and their nested includes) for many
    /// instances: one query per relationship per level.
    #[tracing::instrument(level = "debug", skip(self, cx, db, instances, includes), fields(entity = %self.entity.name()))]
    pub async fn load_relationships_many<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        instances: &mut [Instance],
        includes: &[Include],
    ) -> Outcome<(), Error> {
        if let Some(foreign) = instances.iter().find(|i| i.entity().name() != self.entity.name()) {
            return Outcome::Err(Error::new(
                ErrorKind::Configuration,
                format!(
                    "cannot load {} relationships onto a {} instance",
                    self.entity.name(),
                    foreign.entity().name()
                ),
            ));
        }
        for include in includes {
            let rel = try_result!(self.entity.relationship(&include.name));
            for instance in instances.iter_mut() {
                instance.take_related(&rel.name);
            }
        }
        resolver::load(cx, db, self.orm, self.entity, instances, includes).await
    }

    /// Caller includes plus this entity's auto-loaded relationships.
    fn root_includes(&self, spec: &QuerySpec) -> Vec<Include> {
        resolver::with_auto_load(self.entity, &spec.include)
    }

    /// SELECT, join what can be joined, map rows, then batch-load the rest.
    async fn select<E: Executor + ?Sized>(
        &self,
        cx: &Cx,
        db: &E,
        spec: &QuerySpec,
        join_to_many: bool,
    ) -> Outcome<Vec<Instance>, Error> {
        let includes = self.root_includes(spec);
        let mut spec = spec.clone();
        let mut joins = Vec::new();
        for include in &includes {
            let rel = try_result!(self.entity.relationship(&include.name));
            if rel.kind == RelationshipKind::BelongsTo && !spec.columns.is_empty() {
                spec.columns.push(rel.local_key.clone());
            }
            if join_to_many || !rel.is_to_many() {
                joins.push(rel.name.clone());
            }
        }

        let mut builder = SelectBuilder::new(self.orm.registry(), self.entity, &spec);
        for name in &joins {
            builder = try_result!(builder.join(name));
        }
        let select = try_result!(builder.build());
        let result = try_outcome!(run(cx, db, self.orm.config(), &select.statement, self.target(Operation::Read)).await);

        let records = map_joined_rows(&result.rows, &select.relationships, self.entity.primary_key_column());
        let mut instances = Vec::with_capacity(records.len());
        for record in records {
            let mut instance = try_result!(Instance::from_row(self.orm, self.entity, &record.base));
            for (name, rows) in record.related {
                let rel = try_result!(self.entity.relationship(&name));
                let target = try_result!(self.orm.registry().get(&rel.target));
                let related = match rows {
                    RelatedRows::One(row) => Related::One(match row {
                        Some(row) => Some(Box::new(try_result!(Instance::from_row(self.orm, target, &row)))),
                        None => None,
                    }),
                    RelatedRows::Many(rows) => {
                        let mut list = Vec::with_capacity(rows.len());
                        for row in &rows {
                            list.push(try_result!(Instance::from_row(self.orm, target, row)));
                        }
                        Related::Many(list)
                    }
                };
                instance.set_related(&rel.name, related);
            }
            instances.push(instance);
        }

        try_outcome!(resolver::load(cx, db, self.orm, self.entity, &mut instances, &includes).await);
        Outcome::Ok(instances)
    }
}

/// Validate, INSERT and materialize the returned row.
pub(crate) async fn insert_instance<E: Executor + ?Sized>(
    cx: &Cx,
    db: &E,
    orm: &Orm,
    entity: &Arc<Entity>,
    data: Data,
) -> Outcome<Instance, Error> {
    let data = try_result!(prepare_insert(entity, data));
    let statement = try_result!(InsertBuilder::new(entity.table(), entity.fields(), &data).build());
    let target = Target::new(Operation::Create, entity.name(), entity.table());
    let result = try_outcome!(run(cx, db, orm.config(), &statement, target).await);
    let Some(row) = result.first() else {
        return Outcome::Err(Error::new(
            ErrorKind::Database,
            format!("create {} failed: INSERT returned no row", entity.name()),
        ));
    };
    Outcome::Ok(try_result!(Instance::from_row(orm, entity, row)))
}
