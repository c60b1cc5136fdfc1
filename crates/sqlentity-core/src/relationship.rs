//! Relationship metadata.
//!
//! Relationships are declared on an [`crate::EntityDecl`] with a
//! [`RelationshipDecl`] and resolved into a [`Relationship`] when the registry
//! is built. Resolution fills in default keys and checks that the target
//! entity exists, so a broken declaration fails at start-up instead of at the
//! first query that touches it.

use crate::filter::{Filter, OrderBy};

/// The kind of association between two entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Many-to-one: a `Meter` belongs to one `Site` (foreign key on the owner).
    #[default]
    BelongsTo,
    /// One-to-one: a `Meter` has one `Calibration` (foreign key on the related side).
    HasOne,
    /// One-to-many: a `Site` has many `Meter`s.
    HasMany,
    /// Many-to-many through a junction table.
    ManyToMany,
}

impl RelationshipKind {
    /// True for kinds that load a list.
    #[must_use]
    pub const fn is_to_many(self) -> bool {
        matches!(self, RelationshipKind::HasMany | RelationshipKind::ManyToMany)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RelationshipKind::BelongsTo => "belongsTo",
            RelationshipKind::HasOne => "hasOne",
            RelationshipKind::HasMany => "hasMany",
            RelationshipKind::ManyToMany => "manyToMany",
        }
    }
}

/// A junction table for many-to-many relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTable {
    /// Junction table name (e.g. `"meter_tags"`).
    pub table: String,
    /// Junction column pointing at the owning entity (e.g. `"meter_id"`).
    pub local_column: String,
    /// Junction column pointing at the related entity (e.g. `"tag_id"`).
    pub remote_column: String,
}

impl LinkTable {
    pub fn new(
        table: impl Into<String>,
        local_column: impl Into<String>,
        remote_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            local_column: local_column.into(),
            remote_column: remote_column.into(),
        }
    }
}

/// A relationship as declared.
///
/// Unset keys get defaults at registry build time:
///
/// - `belongsTo`: `foreign_key` = `<target_snake>_id` on the owner,
///   `target_key` = the target's primary key.
/// - `hasOne` / `hasMany`: `foreign_key` = `<owner_snake>_id` on the target,
///   `target_key` = the owner's primary key.
/// - `manyToMany`: junction columns default to `<owner_snake>_id` and
///   `<target_snake>_id`; `target_key` = the owner's primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDecl {
    pub name: String,
    pub kind: RelationshipKind,
    /// Name of the related entity in the registry.
    pub target: String,
    pub foreign_key: Option<String>,
    pub target_key: Option<String>,
    /// Junction table (many-to-many only).
    pub through: Option<String>,
    /// Junction column pointing at the related entity (many-to-many only).
    pub through_target_key: Option<String>,
    /// Property name the loaded data is attached under (defaults to `name`).
    pub alias: Option<String>,
    /// Load whenever the owning entity is loaded through an include.
    pub auto_load: bool,
    /// Related fields to select (empty = all).
    pub selected_columns: Vec<String>,
    /// Extra conditions scoping the related rows.
    pub extra_filters: Filter,
    pub order_by: Vec<OrderBy>,
    /// Row cap for to-many loads of a single instance.
    pub limit: Option<u64>,
}

impl RelationshipDecl {
    pub fn new(name: impl Into<String>, kind: RelationshipKind, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: None,
            target_key: None,
            through: None,
            through_target_key: None,
            alias: None,
            auto_load: false,
            selected_columns: Vec::new(),
            extra_filters: Filter::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::BelongsTo, target)
    }

    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::HasOne, target)
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RelationshipKind::HasMany, target)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        through: impl Into<String>,
    ) -> Self {
        let mut decl = Self::new(name, RelationshipKind::ManyToMany, target);
        decl.through = Some(through.into());
        decl
    }

    #[must_use]
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        self.foreign_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn target_key(mut self, key: impl Into<String>) -> Self {
        self.target_key = Some(key.into());
        self
    }

    /// Junction column pointing at the related entity.
    #[must_use]
    pub fn through_target_key(mut self, key: impl Into<String>) -> Self {
        self.through_target_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn auto_load(mut self, value: bool) -> Self {
        self.auto_load = value;
        self
    }

    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.extra_filters = filter;
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
}

/// A relationship after registry resolution. All keys are storage columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    /// Related entity name.
    pub target: String,
    /// Related entity table.
    pub target_table: String,
    /// Declared-or-defaulted foreign key column.
    pub foreign_key: String,
    /// Declared-or-defaulted target key column.
    pub target_key: String,
    /// Column on the owner's table the match starts from.
    pub local_key: String,
    /// Column on the related table the match ends on (for many-to-many, the
    /// related key the junction points at).
    pub remote_key: String,
    pub link: Option<LinkTable>,
    pub alias: Option<String>,
    pub auto_load: bool,
    /// Related storage columns to select; always contains the related primary key
    /// and `remote_key` when non-empty.
    pub selected_columns: Vec<String>,
    pub extra_filters: Filter,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
}

impl Relationship {
    /// Property name loaded data is attached under.
    #[must_use]
    pub fn attach_as(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// True if `name` refers to this relationship by name or alias.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.alias.as_deref() == Some(name)
    }

    #[must_use]
    pub const fn is_to_many(&self) -> bool {
        self.kind.is_to_many()
    }
}
