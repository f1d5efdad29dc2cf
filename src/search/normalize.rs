//! Canonical tag names and metatag triples.

use std::fmt;

use super::predicate::Comparator;

/// A token after canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Tag(String),
    Meta {
        name: String,
        comparator: Comparator,
        value: String,
    },
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalized::Tag(name) => f.write_str(name),
            Normalized::Meta {
                name,
                comparator: Comparator::Eq,
                value,
            } => write!(f, "{}:{}", name, value),
            Normalized::Meta {
                name,
                comparator,
                value,
            } => write!(f, "{}:{}{}", name, comparator.as_sql(), value),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

fn is_value_char(c: char) -> bool {
    is_name_char(c) || c == '.' || c == '-'
}

fn sanitize(s: &str, allowed: fn(char) -> bool) -> String {
    s.chars().map(|c| if allowed(c) { c } else { '_' }).collect()
}

/// Split a leading `<`, `>`, `<=`, `>=` or `=` off a metatag value.
fn split_comparator(value: &str) -> (Comparator, &str) {
    for (marker, comparator) in [
        (">=", Comparator::Ge),
        ("<=", Comparator::Le),
        (">", Comparator::Gt),
        ("<", Comparator::Lt),
        ("=", Comparator::Eq),
    ] {
        if let Some(rest) = value.strip_prefix(marker) {
            return (comparator, rest);
        }
    }
    (Comparator::Eq, value)
}

pub fn normalize(token: &str) -> Normalized {
    let collapsed = token.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_");

    if collapsed.matches(':').count() == 1 {
        if let Some((name, value)) = collapsed.split_once(':') {
            let (comparator, value) = split_comparator(value);
            return Normalized::Meta {
                name: sanitize(name, is_name_char),
                comparator,
                value: sanitize(value, is_value_char),
            };
        }
    }

    Normalized::Tag(sanitize(&collapsed, is_name_char))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, comparator: Comparator, value: &str) -> Normalized {
        Normalized::Meta {
            name: name.to_string(),
            comparator,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_plain_tag_cleanup() {
        assert_eq!(normalize("  Cat  "), Normalized::Tag("cat".to_string()));
        assert_eq!(normalize("Star Wars   IV"), Normalized::Tag("star_wars_iv".to_string()));
        assert_eq!(normalize("sci-fi!"), Normalized::Tag("sci_fi_".to_string()));
        assert_eq!(normalize("a:b:c"), Normalized::Tag("a_b_c".to_string()));
    }

    #[test]
    fn test_metatag_comparators() {
        assert_eq!(normalize("score:>5"), meta("score", Comparator::Gt, "5"));
        assert_eq!(normalize("score:>=8"), meta("score", Comparator::Ge, "8"));
        assert_eq!(normalize("score:<3"), meta("score", Comparator::Lt, "3"));
        assert_eq!(normalize("score:<=3"), meta("score", Comparator::Le, "3"));
        assert_eq!(normalize("score:=3"), meta("score", Comparator::Eq, "3"));
        assert_eq!(normalize("Rating:Safe"), meta("rating", Comparator::Eq, "safe"));
    }

    #[test]
    fn test_metatag_value_charset_is_wider() {
        assert_eq!(normalize("score:-2"), meta("score", Comparator::Eq, "-2"));
        assert_eq!(normalize("location:img.png"), meta("location", Comparator::Eq, "img.png"));
        assert_eq!(normalize("na-me:a/b"), meta("na_me", Comparator::Eq, "a_b"));
        // Only a leading marker is a comparator
        assert_eq!(normalize("score:5>"), meta("score", Comparator::Eq, "5_"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["Cat", "Star  Wars", "score:>=8", "rating:safe", "x:<y.z", "weird&*chars", "a:b:c"] {
            let once = normalize(raw);
            let twice = normalize(&once.to_string());
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }
}
