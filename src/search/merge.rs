use std::collections::HashSet;

use super::predicate::TagPredicate;

/// Ad hoc predicates first, then the user's filter; the first occurrence of a
/// name wins, so a query term overrides a filter term of the same name.
pub fn merge(adhoc: Vec<TagPredicate>, filter: Vec<TagPredicate>) -> Vec<TagPredicate> {
    let mut seen: HashSet<String> = HashSet::new();
    let filter = filter.into_iter().map(|mut p| {
        p.from_user_filter = true;
        p
    });

    adhoc
        .into_iter()
        .chain(filter)
        .filter(|p| seen.insert(p.name.clone()))
        .collect()
}
