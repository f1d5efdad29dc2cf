//! Resolve normalized tag names against the catalog.
//!
//! Names are looked up in one batch. Unknown names stay in the output with
//! `exists = false` so callers can report them. Aliases pull their target in
//! with a second batch lookup, exactly one level deep.

use std::collections::{HashMap, HashSet};

use super::predicate::TagPredicate;
use crate::db::{StoreError, TagCatalog};

/// A name to resolve and whether the query excludes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRequest {
    pub name: String,
    pub exclude: bool,
}

impl NameRequest {
    pub fn new(name: impl Into<String>, exclude: bool) -> Self {
        Self {
            name: name.into(),
            exclude,
        }
    }
}

pub fn resolve<C>(catalog: &C, requests: &[NameRequest]) -> Result<Vec<TagPredicate>, StoreError>
where
    C: TagCatalog + ?Sized,
{
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    let names: Vec<String> = requests.iter().map(|r| r.name.clone()).collect();
    let mut by_name: HashMap<String, _> = catalog
        .tags_by_names(&names)?
        .into_iter()
        .map(|tag| (tag.name.clone(), tag))
        .collect();

    let mut resolved = Vec::with_capacity(requests.len());
    for request in requests {
        match by_name.remove(&request.name) {
            Some(tag) => resolved.push(TagPredicate::from_tag(tag, request.exclude)),
            None => resolved.push(TagPredicate::unknown(&request.name, request.exclude)),
        }
    }

    // Alias targets not already named by the query, keyed to the alias's sign
    let present: HashSet<u64> = resolved.iter().filter(|p| p.exists).map(|p| p.id).collect();
    let mut wanted: Vec<(u64, bool)> = Vec::new();
    for pred in resolved.iter().filter(|p| p.exists && p.is_alias && p.aliased_id != 0) {
        if !present.contains(&pred.aliased_id) && !wanted.iter().any(|(id, _)| *id == pred.aliased_id) {
            wanted.push((pred.aliased_id, pred.exclude));
        }
    }
    if wanted.is_empty() {
        return Ok(resolved);
    }

    let ids: Vec<u64> = wanted.iter().map(|(id, _)| *id).collect();
    let mut targets: HashMap<u64, _> = catalog
        .tags_by_ids(&ids)?
        .into_iter()
        .map(|tag| (tag.id, tag))
        .collect();

    for (id, exclude) in wanted {
        match targets.remove(&id) {
            Some(tag) => resolved.push(TagPredicate::from_tag(tag, exclude)),
            None => tracing::debug!(alias_target = id, "alias points at a missing tag"),
        }
    }

    Ok(resolved)
}
