//! Compile resolved predicates into SQL.
//!
//! A [`FilterPlan`] holds one WHERE clause and its parameters. The count,
//! page and adjacent queries all embed that same clause, so a count always
//! describes exactly the rows the page query windows over.

use rusqlite::types::Value;
use serde::Serialize;
use std::collections::BTreeSet;

use super::error::SearchError;
use super::metatags::{self, Target};
use super::predicate::{Comparator, MetaPredicate, MetaValue, TagPredicate};
use crate::db::{HashPair, SqlQuery};

/// The two searchable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Image,
    Collection,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Image => "images",
            EntityKind::Collection => "collections",
        }
    }

    /// Table (or view) holding `(owner, tag_id)` associations
    pub fn tag_table(self) -> &'static str {
        match self {
            EntityKind::Image => "image_tags",
            EntityKind::Collection => "collection_tags",
        }
    }

    pub fn owner_column(self) -> &'static str {
        match self {
            EntityKind::Image => "image_id",
            EntityKind::Collection => "collection_id",
        }
    }

    fn select_columns(self) -> &'static str {
        match self {
            EntityKind::Image => "e.id, e.name, e.location, e.uploader_id, e.rating, e.score_average",
            EntityKind::Collection => {
                "e.id, e.name, \
                 (SELECT i.location FROM collection_members m JOIN images i ON i.id = m.image_id \
                  WHERE m.collection_id = e.id ORDER BY m.order_weight ASC, m.image_id ASC LIMIT 1), \
                 (SELECT COUNT(*) FROM collection_members m WHERE m.collection_id = e.id)"
            }
        }
    }
}

/// Neighbour direction for adjacent lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    kind: EntityKind,
    clause: String,
    params: Vec<Value>,
    similar_to: Option<HashPair>,
    matches_nothing: bool,
}

fn id_value(id: u64) -> Value {
    Value::Integer(id as i64)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

impl FilterPlan {
    pub fn from_predicates(predicates: &[TagPredicate], kind: EntityKind) -> Result<Self, SearchError> {
        let mut include: BTreeSet<u64> = BTreeSet::new();
        let mut exclude: BTreeSet<u64> = BTreeSet::new();
        let mut matches_nothing = false;
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut similar_to = None;

        let mut metas = Vec::new();
        for pred in predicates {
            if let Some(meta) = &pred.meta {
                metas.push((pred, meta));
                continue;
            }
            if !pred.exists {
                // Nothing carries an unknown tag
                if !pred.exclude {
                    matches_nothing = true;
                }
                continue;
            }
            // Associations are keyed by the canonical tag
            let key = if pred.is_alias { pred.aliased_id } else { pred.id };
            if key == 0 {
                if !pred.exclude {
                    matches_nothing = true;
                }
                continue;
            }
            if pred.exclude {
                exclude.insert(key);
            } else {
                include.insert(key);
            }
        }

        if !include.is_empty() {
            conditions.push(format!(
                "e.id IN (SELECT {owner} FROM {tags} WHERE tag_id IN ({ph}) \
                 GROUP BY {owner} HAVING COUNT(DISTINCT tag_id) = ?)",
                owner = kind.owner_column(),
                tags = kind.tag_table(),
                ph = placeholders(include.len()),
            ));
            params.extend(include.iter().map(|id| id_value(*id)));
            params.push(Value::Integer(include.len() as i64));
        }

        if !exclude.is_empty() {
            conditions.push(format!(
                "e.id NOT IN (SELECT {owner} FROM {tags} WHERE tag_id IN ({ph}))",
                owner = kind.owner_column(),
                tags = kind.tag_table(),
                ph = placeholders(exclude.len()),
            ));
            params.extend(exclude.iter().map(|id| id_value(*id)));
        }

        for (pred, meta) in metas {
            let descriptor = metatags::descriptor(&meta.key)
                .filter(|d| d.applies_to(kind))
                .ok_or_else(|| SearchError::MetaTagUnrecognized {
                    name: pred.name.clone(),
                })?;

            match descriptor.target {
                Target::Column(column) => {
                    let escape = if meta.value_is_pattern() { " ESCAPE '\\'" } else { "" };
                    conditions.push(format!("e.{} {} ?{}", column, meta.comparator.as_sql(), escape));
                    params.push(meta.sql_value()?);
                }
                Target::InCollection => {
                    let wanted = matches!(meta.value, MetaValue::Flag(true));
                    let member = wanted == (meta.comparator == Comparator::Eq);
                    let op = if member { "IN" } else { "NOT IN" };
                    conditions.push(format!("e.id {} (SELECT image_id FROM collection_members)", op));
                }
                Target::TagCount => {
                    conditions.push(format!(
                        "(SELECT COUNT(*) FROM image_tags t WHERE t.image_id = e.id) {} ?",
                        meta.comparator.as_sql()
                    ));
                    params.push(meta.sql_value()?);
                }
                Target::OrderSimilar => {
                    if pred.exclude {
                        return Err(SearchError::ComparatorInversionUnsupported {
                            name: pred.name.clone(),
                            comparator: meta.comparator.to_string(),
                        });
                    }
                    match &meta.value {
                        MetaValue::Hashes(pair) => {
                            similar_to.get_or_insert(*pair);
                        }
                        other => {
                            return Err(SearchError::coercion(&pred.name, &other.to_string(), "expected hashes"))
                        }
                    }
                }
            }
        }

        let (clause, params) = if matches_nothing {
            ("1 = 0".to_string(), Vec::new())
        } else if conditions.is_empty() {
            ("1 = 1".to_string(), params)
        } else {
            (conditions.join(" AND "), params)
        };

        Ok(Self {
            kind,
            clause,
            params,
            similar_to,
            matches_nothing,
        })
    }

    pub fn where_clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// True when an include predicate can never be satisfied.
    pub fn matches_nothing(&self) -> bool {
        self.matches_nothing
    }

    pub fn count_query(&self) -> SqlQuery {
        SqlQuery {
            sql: format!("SELECT COUNT(*) FROM {} e WHERE {}", self.kind.table(), self.clause),
            params: self.params.clone(),
        }
    }

    /// Window of the matching rows. A stride of 0 selects every row from `start`.
    pub fn page_query(&self, start: u64, stride: u64) -> SqlQuery {
        let mut params = self.params.clone();
        let (join, order) = match self.similar_to {
            Some(pair) if self.kind == EntityKind::Image => {
                params.push(Value::Integer(pair.h_hash as i64));
                params.push(Value::Integer(pair.v_hash as i64));
                (
                    " LEFT JOIN imaged_hashes h ON h.image_id = e.id",
                    "h.image_id IS NULL, hamming(h.h_hash, ?) + hamming(h.v_hash, ?) ASC, e.id DESC",
                )
            }
            _ => ("", "e.id DESC"),
        };

        let limit = if stride == 0 { -1 } else { stride as i64 };
        params.push(Value::Integer(limit));
        params.push(Value::Integer(start as i64));

        SqlQuery {
            sql: format!(
                "SELECT {} FROM {} e{} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
                self.kind.select_columns(),
                self.kind.table(),
                join,
                self.clause,
                order,
            ),
            params,
        }
    }

    /// Nearest matching id below or above `pivot`, in id order.
    pub fn adjacent_query(&self, pivot: u64, direction: Direction) -> SqlQuery {
        let (op, order) = match direction {
            Direction::Previous => ("<", "DESC"),
            Direction::Next => (">", "ASC"),
        };
        let mut params = self.params.clone();
        params.push(id_value(pivot));
        SqlQuery {
            sql: format!(
                "SELECT e.id FROM {} e WHERE ({}) AND e.id {} ? ORDER BY e.id {} LIMIT 1",
                self.kind.table(),
                self.clause,
                op,
                order
            ),
            params,
        }
    }
}

impl MetaPredicate {
    fn value_is_pattern(&self) -> bool {
        matches!(self.value, MetaValue::Pattern(_))
    }

    fn sql_value(&self) -> Result<Value, SearchError> {
        match &self.value {
            MetaValue::Text(s) | MetaValue::Pattern(s) => Ok(Value::Text(s.clone())),
            MetaValue::Integer(n) => Ok(Value::Integer(*n)),
            MetaValue::UserId(id) => Ok(id_value(*id)),
            MetaValue::Flag(b) => Ok(Value::Integer(i64::from(*b))),
            MetaValue::Hashes(_) => Err(SearchError::coercion(
                &self.key,
                &self.value.to_string(),
                "hashes only order results",
            )),
        }
    }
}
