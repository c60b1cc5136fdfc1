//! Relationship resolution by batch loading.
//!
//! Each level of an include tree costs at most one query per relationship:
//! the owning keys of every instance are collected, deduplicated and looked up
//! with a single `IN` list, and the related rows are grouped back onto their
//! owners in memory. Relationships already filled by an eager JOIN are not
//! queried again; only their nested includes are resolved.
//!
//! Traversal tracks `"<Entity>.<relationship>"` tokens along the current path.
//! A token seen twice means the include graph cycles; that branch is attached
//! empty instead of recursing.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use asupersync::{Cx, Outcome};
use sqlentity_core::{Entity, Error, Executor, Operation, Relationship, Value};
use sqlentity_query::{Include, PARENT_KEY_ALIAS, RelatedSelectBuilder};

use crate::exec::{Target, run};
use crate::instance::{Instance, Related};
use crate::model::Orm;

type LevelFuture<'a> = Pin<Box<dyn Future<Output = Outcome<(), Error>> + 'a>>;

struct LoadContext<'a, E: ?Sized> {
    cx: &'a Cx,
    db: &'a E,
    orm: &'a Orm,
}

/// `includes` plus every auto-loaded relationship of `entity` not already named.
pub(crate) fn with_auto_load(entity: &Entity, includes: &[Include]) -> Vec<Include> {
    let mut merged = includes.to_vec();
    for rel in entity.auto_load_relationships() {
        if !merged.iter().any(|i| rel.answers_to(&i.name)) {
            merged.push(Include::new(rel.name.clone()));
        }
    }
    merged
}

/// Resolve `includes` onto `instances` of `entity`.
///
/// Root includes are taken as given; auto-loaded relationships are added from
/// the first nested level on.
pub(crate) async fn load<E: Executor + ?Sized>(
    cx: &Cx,
    db: &E,
    orm: &Orm,
    entity: &Arc<Entity>,
    instances: &mut [Instance],
    includes: &[Include],
) -> Outcome<(), Error> {
    if instances.is_empty() || includes.is_empty() {
        return Outcome::Ok(());
    }
    let ctx = LoadContext { cx, db, orm };
    load_level(&ctx, Arc::clone(entity), instances, includes.to_vec(), Vec::new()).await
}

fn load_level<'a, 'c, E: Executor + ?Sized>(
    ctx: &'a LoadContext<'c, E>,
    entity: Arc<Entity>,
    instances: &'a mut [Instance],
    includes: Vec<Include>,
    path: Vec<String>,
) -> LevelFuture<'a> {
    Box::pin(async move {
        if instances.is_empty() {
            return Outcome::Ok(());
        }
        let includes = if path.is_empty() {
            includes
        } else {
            with_auto_load(&entity, &includes)
        };

        for include in includes {
            let rel = try_result!(entity.relationship(&include.name)).clone();
            let token = format!("{}.{}", entity.name(), rel.name);
            if path.contains(&token) {
                tracing::warn!(%token, depth = path.len(), "Relationship cycle; attaching empty result");
                attach_empty(instances, &rel);
                continue;
            }
            if path.len() >= ctx.orm.config().max_include_depth {
                tracing::warn!(%token, depth = path.len(), "Include depth limit reached; attaching empty result");
                attach_empty(instances, &rel);
                continue;
            }
            let target = Arc::clone(try_result!(ctx.orm.registry().get(&rel.target)));
            let mut child_path = path.clone();
            child_path.push(token);

            if instances.iter().all(|i| i.has_related(&rel.name)) {
                try_outcome!(descend_joined(ctx, target, instances, &rel, include.nested, child_path).await);
                continue;
            }
            try_outcome!(batch_load(ctx, &entity, target, instances, &rel, include.nested, child_path).await);
        }
        Outcome::Ok(())
    })
}

fn attach_empty(instances: &mut [Instance], rel: &Relationship) {
    for instance in instances.iter_mut() {
        if !instance.has_related(&rel.name) {
            instance.set_related(&rel.name, Related::empty(rel.is_to_many()));
        }
    }
}

/// Resolve nested includes below a relationship filled by a JOIN.
async fn descend_joined<E: Executor + ?Sized>(
    ctx: &LoadContext<'_, E>,
    target: Arc<Entity>,
    instances: &mut [Instance],
    rel: &Relationship,
    nested: Vec<Include>,
    path: Vec<String>,
) -> Outcome<(), Error> {
    let mut children = Vec::new();
    let mut counts = Vec::with_capacity(instances.len());
    for instance in instances.iter_mut() {
        let taken = instance.take_related(&rel.name).map(Related::into_instances).unwrap_or_default();
        counts.push(taken.len());
        children.extend(taken);
    }

    let outcome = load_level(ctx, target, &mut children, nested, path).await;

    let mut children = children.into_iter();
    for (instance, count) in instances.iter_mut().zip(counts) {
        let group: Vec<Instance> = children.by_ref().take(count).collect();
        instance.set_related(&rel.name, Related::from_instances(rel.is_to_many(), group));
    }
    outcome
}

/// Load one relationship for every instance with a single query.
async fn batch_load<E: Executor + ?Sized>(
    ctx: &LoadContext<'_, E>,
    owner: &Entity,
    target: Arc<Entity>,
    instances: &mut [Instance],
    rel: &Relationship,
    nested: Vec<Include>,
    path: Vec<String>,
) -> Outcome<(), Error> {
    let mut keys: Vec<Value> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for instance in instances.iter() {
        let Some(value) = instance.get(&rel.local_key) else {
            continue;
        };
        if let Some(key) = value.group_key() {
            if seen.insert(key) {
                keys.push(value.clone());
            }
        }
    }

    let limit = if instances.len() == 1 { rel.limit } else { None };
    let statement = try_result!(RelatedSelectBuilder::new(rel, &target, &keys).limit(limit).build());
    let Some(statement) = statement else {
        tracing::debug!(
            entity = owner.name(),
            relationship = %rel.name,
            parents = instances.len(),
            "No keys to load; skipping query"
        );
        for instance in instances.iter_mut() {
            instance.set_related(&rel.name, Related::empty(rel.is_to_many()));
        }
        return Outcome::Ok(());
    };

    let query_target = Target::new(Operation::Relation, target.name(), target.table());
    let result = try_outcome!(run(ctx.cx, ctx.db, ctx.orm.config(), &statement, query_target).await);

    let grouping_column = if rel.link.is_some() {
        PARENT_KEY_ALIAS
    } else {
        rel.remote_key.as_str()
    };
    let mut children = Vec::with_capacity(result.rows.len());
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for row in &result.rows {
        let Some(key) = row.get_by_name(grouping_column).and_then(Value::group_key) else {
            continue;
        };
        groups.entry(key).or_default().push(children.len());
        children.push(try_result!(Instance::from_row(ctx.orm, &target, row)));
    }

    tracing::info!(
        entity = owner.name(),
        relationship = %rel.name,
        parents = instances.len(),
        keys = keys.len(),
        rows = children.len(),
        queries = 1,
        "Batch-loaded relationship"
    );

    try_outcome!(load_level(ctx, target, &mut children, nested, path).await);

    for instance in instances.iter_mut() {
        let indices = instance
            .get(&rel.local_key)
            .and_then(Value::group_key)
            .and_then(|key| groups.get(&key));
        let group: Vec<Instance> = indices
            .map(|indices| indices.iter().map(|&i| children[i].clone()).collect())
            .unwrap_or_default();
        instance.set_related(&rel.name, Related::from_instances(rel.is_to_many(), group));
    }
    Outcome::Ok(())
}
