//! Reassembles flat JOIN results into records with nested relationships.
//!
//! A LEFT JOIN onto a to-many relationship repeats the owning row once per
//! related row. [`map_joined_rows`] groups by the owner's primary key (keeping
//! first-seen order), strips the prefixed relationship columns off the base
//! row and collects each relationship's rows.

use std::collections::{HashMap, HashSet};

use sqlentity_core::{Row, Value};

use crate::select::{JoinedRelation, RelationshipMap};

/// Rows loaded for one relationship of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedRows {
    /// `belongsTo` / `hasOne`: the related row, or `None` when absent.
    One(Option<Row>),
    /// `hasMany` / `manyToMany`: distinct related rows in query order.
    Many(Vec<Row>),
}

impl RelatedRows {
    /// Empty value for a relationship kind.
    #[must_use]
    pub fn empty(to_many: bool) -> Self {
        if to_many {
            RelatedRows::Many(Vec::new())
        } else {
            RelatedRows::One(None)
        }
    }

    pub fn rows(&self) -> Vec<&Row> {
        match self {
            RelatedRows::One(row) => row.iter().collect(),
            RelatedRows::Many(rows) => rows.iter().collect(),
        }
    }
}

/// One base record with the relationships that were joined for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub base: Row,
    pub related: Vec<(String, RelatedRows)>,
}

impl MappedRecord {
    pub fn related(&self, name: &str) -> Option<&RelatedRows> {
        self.related.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }
}

struct Group {
    record: MappedRecord,
    seen: Vec<HashSet<String>>,
}

/// Group joined rows by `pk_column` and unpack related columns.
///
/// With an empty relationship map every row maps to its own record unchanged.
#[must_use]
pub fn map_joined_rows(rows: &[Row], map: &RelationshipMap, pk_column: &str) -> Vec<MappedRecord> {
    if map.is_empty() {
        return rows
            .iter()
            .map(|row| MappedRecord {
                base: row.clone(),
                related: Vec::new(),
            })
            .collect();
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (position, row) in rows.iter().enumerate() {
        let key = row
            .get_by_name(pk_column)
            .and_then(Value::group_key)
            .unwrap_or_else(|| format!("\u{0}row{position}"));
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                groups.push(Group {
                    record: MappedRecord {
                        base: strip_related(row, map),
                        related: map
                            .relations
                            .iter()
                            .map(|r| (r.name.clone(), RelatedRows::empty(r.kind.is_to_many())))
                            .collect(),
                    },
                    seen: vec![HashSet::new(); map.len()],
                });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        for (i, relation) in map.relations.iter().enumerate() {
            let Some((related_key, related_row)) = extract_related(row, relation) else {
                continue;
            };
            match &mut group.record.related[i].1 {
                RelatedRows::One(existing) => {
                    if existing.is_none() {
                        *existing = Some(related_row);
                    }
                }
                RelatedRows::Many(list) => {
                    if group.seen[i].insert(related_key) {
                        list.push(related_row);
                    }
                }
            }
        }
    }

    groups.into_iter().map(|g| g.record).collect()
}

fn strip_related(row: &Row, map: &RelationshipMap) -> Row {
    Row::from_pairs(
        row.iter()
            .filter(|(column, _)| !map.owns_column(column))
            .map(|(column, value)| (column.to_string(), value.clone())),
    )
}

fn extract_related(row: &Row, relation: &JoinedRelation) -> Option<(String, Row)> {
    let key = row
        .get_by_name(&relation.alias_for(&relation.pk_column))
        .and_then(Value::group_key)?;
    let related = Row::from_pairs(relation.columns.iter().map(|column| {
        let value = row
            .get_by_name(&relation.alias_for(column))
            .cloned()
            .unwrap_or(Value::Null);
        (column.clone(), value)
    }));
    Some((key, related))
}
