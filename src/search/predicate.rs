use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::db::{HashPair, Tag};

/// SQL comparison operator attached to a metatag predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
}

impl Comparator {
    /// Logical negation of the comparison.
    pub fn invert(self) -> Self {
        match self {
            Comparator::Eq => Comparator::Ne,
            Comparator::Ne => Comparator::Eq,
            Comparator::Lt => Comparator::Ge,
            Comparator::Ge => Comparator::Lt,
            Comparator::Gt => Comparator::Le,
            Comparator::Le => Comparator::Gt,
            Comparator::Like => Comparator::NotLike,
            Comparator::NotLike => Comparator::Like,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Like => "LIKE",
            Comparator::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Coerced right-hand side of a metatag predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    UserId(u64),
    Flag(bool),
    /// LIKE pattern with `\` as the escape character
    Pattern(String),
    Hashes(HashPair),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Text(s) | MetaValue::Pattern(s) => f.write_str(s),
            MetaValue::Integer(n) => write!(f, "{}", n),
            MetaValue::UserId(id) => write!(f, "user #{}", id),
            MetaValue::Flag(b) => write!(f, "{}", b),
            MetaValue::Hashes(pair) => write!(f, "{}.{}", pair.h_hash, pair.v_hash),
        }
    }
}

/// Structured part of a metatag predicate. `key` is the canonical registry name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaPredicate {
    pub key: String,
    pub value: MetaValue,
    pub comparator: Comparator,
}

/// One resolved filter condition derived from a query token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagPredicate {
    pub name: String,
    pub id: u64,
    pub description: String,
    pub uploader_id: u64,
    pub upload_time: Option<DateTime<Utc>>,
    pub aliased_id: u64,
    pub is_alias: bool,
    pub exists: bool,
    pub exclude: bool,
    pub from_user_filter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaPredicate>,
}

impl TagPredicate {
    /// A plain tag name the catalog does not know.
    pub fn unknown(name: impl Into<String>, exclude: bool) -> Self {
        Self {
            name: name.into(),
            id: 0,
            description: String::new(),
            uploader_id: 0,
            upload_time: None,
            aliased_id: 0,
            is_alias: false,
            exists: false,
            exclude,
            from_user_filter: false,
            meta: None,
        }
    }

    pub fn from_tag(tag: Tag, exclude: bool) -> Self {
        Self {
            name: tag.name,
            id: tag.id,
            description: tag.description,
            uploader_id: tag.uploader_id,
            upload_time: tag.upload_time,
            aliased_id: tag.aliased_id,
            is_alias: tag.is_alias,
            exists: true,
            exclude,
            from_user_filter: false,
            meta: None,
        }
    }

    pub fn meta(name: impl Into<String>, meta: MetaPredicate, exclude: bool) -> Self {
        Self {
            exists: true,
            meta: Some(meta),
            ..Self::unknown(name, exclude)
        }
    }

    pub fn is_meta(&self) -> bool {
        self.meta.is_some()
    }
}

impl fmt::Display for TagPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.exclude { "-" } else { "" };
        match &self.meta {
            Some(meta) => write!(f, "{}{} [{} {}]", sign, self.name, meta.comparator, meta.value),
            None if !self.exists => write!(f, "{}{} (unknown)", sign, self.name),
            None if self.is_alias => {
                write!(f, "{}{} (#{} -> #{})", sign, self.name, self.id, self.aliased_id)
            }
            None => write!(f, "{}{} (#{})", sign, self.name, self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_is_involution() {
        for c in [
            Comparator::Eq,
            Comparator::Ne,
            Comparator::Lt,
            Comparator::Le,
            Comparator::Gt,
            Comparator::Ge,
            Comparator::Like,
            Comparator::NotLike,
        ] {
            assert_eq!(c.invert().invert(), c);
        }
        assert_eq!(Comparator::Gt.invert(), Comparator::Le);
        assert_eq!(Comparator::Lt.invert(), Comparator::Ge);
        assert_eq!(Comparator::Eq.invert(), Comparator::Ne);
    }

    #[test]
    fn test_meta_predicate_flags() {
        let pred = TagPredicate::meta(
            "score",
            MetaPredicate {
                key: "score".to_string(),
                value: MetaValue::Integer(5),
                comparator: Comparator::Le,
            },
            true,
        );
        assert!(pred.is_meta());
        assert!(pred.exists);
        assert!(pred.exclude);
        assert_eq!(pred.to_string(), "-score [<= 5]");
        assert!(!TagPredicate::unknown("ghost", false).is_meta());
    }
}
