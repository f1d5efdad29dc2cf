//! Metatag registry and interpretation.
//!
//! A metatag is a `name:value` token that filters on an entity column or a
//! derived property instead of a tag association. Each registered name is a
//! [`MetaTagDescriptor`]; adding a metatag means adding a registry row.

use super::compiler::EntityKind;
use super::error::SearchError;
use super::predicate::{Comparator, MetaPredicate, MetaValue, TagPredicate};
use crate::db::{AssociationStore, HashPair, TagCatalog};

/// What a metatag filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A column of the entity table
    Column(&'static str),
    /// Membership in any collection
    InCollection,
    /// Live number of tag associations
    TagCount,
    /// Ordering by perceptual-hash distance
    OrderSimilar,
}

/// How the raw value is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    UserName,
    Text,
    Integer,
    Flag,
    /// Image id or a literal `h.v` hash pair
    Similarity,
    Pattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorRule {
    /// Use the comparator written in the query
    AsWritten,
    Forced(Comparator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Images,
    All,
}

#[derive(Debug, Clone, Copy)]
pub struct MetaTagDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub target: Target,
    pub value: ValueKind,
    pub comparator: ComparatorRule,
    pub negatable: bool,
    pub scope: Scope,
}

impl MetaTagDescriptor {
    pub fn applies_to(&self, kind: EntityKind) -> bool {
        match self.scope {
            Scope::All => true,
            Scope::Images => kind == EntityKind::Image,
        }
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.contains(&name)
    }
}

pub static REGISTRY: &[MetaTagDescriptor] = &[
    MetaTagDescriptor {
        name: "uploader",
        aliases: &[],
        target: Target::Column("uploader_id"),
        value: ValueKind::UserName,
        comparator: ComparatorRule::Forced(Comparator::Eq),
        negatable: true,
        scope: Scope::All,
    },
    MetaTagDescriptor {
        name: "rating",
        aliases: &[],
        target: Target::Column("rating"),
        value: ValueKind::Text,
        comparator: ComparatorRule::Forced(Comparator::Eq),
        negatable: true,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "score",
        aliases: &["averagescore"],
        target: Target::Column("score_average"),
        value: ValueKind::Integer,
        comparator: ComparatorRule::AsWritten,
        negatable: true,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "totalscore",
        aliases: &[],
        target: Target::Column("score_total"),
        value: ValueKind::Integer,
        comparator: ComparatorRule::AsWritten,
        negatable: true,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "scorevoters",
        aliases: &[],
        target: Target::Column("score_voters"),
        value: ValueKind::Integer,
        comparator: ComparatorRule::AsWritten,
        negatable: true,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "incollection",
        aliases: &[],
        target: Target::InCollection,
        value: ValueKind::Flag,
        comparator: ComparatorRule::Forced(Comparator::Eq),
        negatable: true,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "tagcount",
        aliases: &[],
        target: Target::TagCount,
        value: ValueKind::Integer,
        comparator: ComparatorRule::AsWritten,
        negatable: true,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "ordersimilar",
        aliases: &[],
        target: Target::OrderSimilar,
        value: ValueKind::Similarity,
        comparator: ComparatorRule::Forced(Comparator::Eq),
        negatable: false,
        scope: Scope::Images,
    },
    MetaTagDescriptor {
        name: "name",
        aliases: &[],
        target: Target::Column("name"),
        value: ValueKind::Pattern,
        comparator: ComparatorRule::Forced(Comparator::Like),
        negatable: true,
        scope: Scope::All,
    },
    MetaTagDescriptor {
        name: "location",
        aliases: &[],
        target: Target::Column("location"),
        value: ValueKind::Pattern,
        comparator: ComparatorRule::Forced(Comparator::Like),
        negatable: true,
        scope: Scope::Images,
    },
];

/// Find the descriptor registered under `name` for an entity kind.
pub fn lookup(name: &str, kind: EntityKind) -> Option<&'static MetaTagDescriptor> {
    REGISTRY
        .iter()
        .find(|d| d.answers_to(name) && d.applies_to(kind))
}

/// Descriptor by canonical name, regardless of entity kind.
pub fn descriptor(key: &str) -> Option<&'static MetaTagDescriptor> {
    REGISTRY.iter().find(|d| d.name == key)
}

/// Build the predicate for one normalized metatag token.
pub fn interpret<C, S>(
    catalog: &C,
    store: &S,
    name: &str,
    written: Comparator,
    value: &str,
    exclude: bool,
    kind: EntityKind,
) -> Result<TagPredicate, SearchError>
where
    C: TagCatalog + ?Sized,
    S: AssociationStore,
{
    let descriptor = lookup(name, kind).ok_or_else(|| SearchError::MetaTagUnrecognized {
        name: name.to_string(),
    })?;

    let mut comparator = match descriptor.comparator {
        ComparatorRule::AsWritten => written,
        ComparatorRule::Forced(c) => c,
    };

    let value = coerce(catalog, store, name, descriptor.value, value)?;

    if exclude {
        if !descriptor.negatable {
            return Err(SearchError::ComparatorInversionUnsupported {
                name: name.to_string(),
                comparator: comparator.to_string(),
            });
        }
        comparator = comparator.invert();
    }

    Ok(TagPredicate::meta(
        descriptor.name,
        MetaPredicate {
            key: descriptor.name.to_string(),
            value,
            comparator,
        },
        exclude,
    ))
}

fn coerce<C, S>(
    catalog: &C,
    store: &S,
    name: &str,
    kind: ValueKind,
    value: &str,
) -> Result<MetaValue, SearchError>
where
    C: TagCatalog + ?Sized,
    S: AssociationStore,
{
    match kind {
        ValueKind::UserName => match catalog.user_id_by_name(value)? {
            Some(id) => Ok(MetaValue::UserId(id)),
            None => Err(SearchError::coercion(name, value, "no such user")),
        },
        ValueKind::Text => {
            if value.is_empty() {
                Err(SearchError::coercion(name, value, "value is empty"))
            } else {
                Ok(MetaValue::Text(value.to_string()))
            }
        }
        ValueKind::Integer => value
            .parse::<i64>()
            .map(MetaValue::Integer)
            .map_err(|_| SearchError::coercion(name, value, "not an integer")),
        ValueKind::Flag => match value {
            "y" | "yes" | "true" | "1" => Ok(MetaValue::Flag(true)),
            "n" | "no" | "false" | "0" => Ok(MetaValue::Flag(false)),
            _ => Err(SearchError::coercion(name, value, "expected yes or no")),
        },
        ValueKind::Similarity => similarity_hashes(store, name, value).map(MetaValue::Hashes),
        ValueKind::Pattern => like_pattern(value)
            .map(MetaValue::Pattern)
            .ok_or_else(|| SearchError::coercion(name, value, "pattern must be longer than 3 characters")),
    }
}

fn similarity_hashes<S: AssociationStore>(
    store: &S,
    name: &str,
    value: &str,
) -> Result<HashPair, SearchError> {
    if let Some((h, v)) = value.split_once('.') {
        let h = h.parse::<u64>();
        let v = v.parse::<u64>();
        return match (h, v) {
            (Ok(h), Ok(v)) => Ok(HashPair::new(h, v)),
            _ => Err(SearchError::coercion(name, value, "expected two unsigned hashes")),
        };
    }

    let image_id = value
        .parse::<u64>()
        .map_err(|_| SearchError::coercion(name, value, "expected an image id"))?;
    store
        .image_hashes(image_id)?
        .ok_or_else(|| SearchError::coercion(name, value, "image has no perceptual hash"))
}

/// `a__b_c` matches any name containing `a b_c`. `\` escapes the literal `_`.
fn like_pattern(value: &str) -> Option<String> {
    if value.chars().count() <= 3 {
        return None;
    }
    let literal = value.replace("__", " ").replace('_', "\\_");
    Some(format!("%{}%", literal))
}
