//! Tag query parsing and search resolution.
//!
//! Raw query text flows tokenizer → normalizer → resolver / metatag
//! interpreter → compiler → pagination. [`SearchEngine`] ties the stages
//! together over a store implementing both collaborator traits.

pub mod compiler;
pub mod count_cache;
mod error;
pub mod merge;
pub mod metatags;
pub mod normalize;
pub mod pagination;
pub mod predicate;
pub mod resolver;
pub mod tokenizer;

use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

pub use compiler::{Direction, EntityKind, FilterPlan};
pub use count_cache::{Clock, ImageCountCache, SystemClock};
pub use error::SearchError;
pub use pagination::{PageMenu, PageWindow, SearchResult};
pub use predicate::{Comparator, MetaPredicate, MetaValue, TagPredicate};

use crate::db::{AssociationStore, CollectionSummary, ImageSummary, TagCatalog};
use normalize::Normalized;
use resolver::NameRequest;

/// Neighbours of a pivot image within a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Adjacent {
    pub prev: Option<u64>,
    pub next: Option<u64>,
}

enum Slot {
    Tag(usize),
    Meta(TagPredicate),
}

pub struct SearchEngine<'a, S> {
    store: &'a S,
}

impl<'a, S> SearchEngine<'a, S>
where
    S: TagCatalog + AssociationStore,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Parse raw query text into resolved predicates for one entity kind.
    ///
    /// Unknown tag names are returned with `exists = false`. Metatag problems
    /// abort the whole parse.
    pub fn parse_query(&self, raw: &str, kind: EntityKind) -> Result<Vec<TagPredicate>, SearchError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut slots = Vec::new();
        let mut requests = Vec::new();

        for token in tokenizer::tokenize(raw) {
            let normalized = normalize::normalize(&token.text);
            // Metatags share a name with every spelling of the same registry entry
            let key = match &normalized {
                Normalized::Tag(name) => name.as_str(),
                Normalized::Meta { name, .. } => {
                    metatags::lookup(name, kind).map_or(name.as_str(), |d| d.name)
                }
            };
            if key.is_empty() || !seen.insert(key.to_string()) {
                continue;
            }
            match normalized {
                Normalized::Tag(name) => {
                    slots.push(Slot::Tag(requests.len()));
                    requests.push(NameRequest::new(name, token.negated));
                }
                Normalized::Meta {
                    name,
                    comparator,
                    value,
                } => {
                    let pred = metatags::interpret(
                        self.store,
                        self.store,
                        &name,
                        comparator,
                        &value,
                        token.negated,
                        kind,
                    )?;
                    slots.push(Slot::Meta(pred));
                }
            }
        }

        let mut resolved = resolver::resolve(self.store, &requests)?.into_iter().map(Some).collect::<Vec<_>>();

        let mut out = Vec::with_capacity(resolved.len() + slots.len());
        for slot in slots {
            match slot {
                Slot::Tag(i) => out.extend(resolved.get_mut(i).and_then(Option::take)),
                Slot::Meta(pred) => out.push(pred),
            }
        }
        // Alias targets pulled in by the resolver
        out.extend(resolved.into_iter().flatten());

        tracing::debug!(query = raw, predicates = out.len(), ?kind, "parsed query");
        Ok(out)
    }

    pub fn search_images(
        &self,
        predicates: &[TagPredicate],
        page_start: u64,
        page_stride: u64,
    ) -> Result<SearchResult<ImageSummary>, SearchError> {
        let plan = FilterPlan::from_predicates(predicates, EntityKind::Image)?;
        let result = pagination::run(
            self.store,
            &plan,
            PageWindow::new(page_start, page_stride),
            |store, query| store.fetch_images(query),
        )?;
        tracing::debug!(total = result.total, returned = result.items.len(), "image search");
        Ok(result)
    }

    pub fn search_collections(
        &self,
        predicates: &[TagPredicate],
        page_start: u64,
        page_stride: u64,
    ) -> Result<SearchResult<CollectionSummary>, SearchError> {
        let plan = FilterPlan::from_predicates(predicates, EntityKind::Collection)?;
        let result = pagination::run(
            self.store,
            &plan,
            PageWindow::new(page_start, page_stride),
            |store, query| store.fetch_collections(query),
        )?;
        tracing::debug!(total = result.total, returned = result.items.len(), "collection search");
        Ok(result)
    }

    /// Previous and next matching image ids around `pivot_id`.
    pub fn get_adjacent(&self, predicates: &[TagPredicate], pivot_id: u64) -> Result<Adjacent, SearchError> {
        if pivot_id == 0 {
            return Err(SearchError::InvalidPivot);
        }
        let plan = FilterPlan::from_predicates(predicates, EntityKind::Image)?;
        if plan.matches_nothing() {
            return Ok(Adjacent::default());
        }
        self.store.snapshot(|| -> Result<Adjacent, SearchError> {
            Ok(Adjacent {
                prev: self.store.fetch_id(&plan.adjacent_query(pivot_id, Direction::Previous))?,
                next: self.store.fetch_id(&plan.adjacent_query(pivot_id, Direction::Next))?,
            })
        })
    }

    /// Merge ad hoc predicates with a parsed user filter; ad hoc terms win.
    pub fn merge_with_user_filter(
        &self,
        adhoc: Vec<TagPredicate>,
        filter_raw: &str,
        kind: EntityKind,
    ) -> Result<Vec<TagPredicate>, SearchError> {
        let filter = self.parse_query(filter_raw, kind)?;
        Ok(merge::merge(adhoc, filter))
    }

    /// The stored filter of a user, parsed fresh.
    pub fn user_filter_predicates(&self, user_id: u64, kind: EntityKind) -> Result<Vec<TagPredicate>, SearchError> {
        let raw = self.store.user_filter(user_id)?;
        let mut preds = self.parse_query(&raw, kind)?;
        for pred in &mut preds {
            pred.from_user_filter = true;
        }
        Ok(preds)
    }

    /// Parse `raw` and fold in the stored filter of `user_id`, if any.
    pub fn query_with_user_filter(
        &self,
        raw: &str,
        user_id: Option<u64>,
        kind: EntityKind,
    ) -> Result<Vec<TagPredicate>, SearchError> {
        let adhoc = self.parse_query(raw, kind)?;
        match user_id {
            Some(id) => Ok(merge::merge(adhoc, self.user_filter_predicates(id, kind)?)),
            None => Ok(adhoc),
        }
    }

    /// A uniformly random image among the matches.
    pub fn random_image(&self, predicates: &[TagPredicate]) -> Result<ImageSummary, SearchError> {
        let plan = FilterPlan::from_predicates(predicates, EntityKind::Image)?;
        if plan.matches_nothing() {
            return Err(SearchError::NoResults);
        }
        self.store.snapshot(|| -> Result<ImageSummary, SearchError> {
            let total = self.store.count_matches(&plan.count_query())?;
            if total == 0 {
                return Err(SearchError::NoResults);
            }
            let offset = rand::thread_rng().gen_range(0..total);
            self.store
                .fetch_images(&plan.page_query(offset, 1))?
                .into_iter()
                .next()
                .ok_or(SearchError::NoResults)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{HashPair, SqliteDb};

    struct Fixture {
        db: SqliteDb,
        alice: u64,
        bob: u64,
        images: Vec<u64>,
        summer: u64,
        winter: u64,
    }

    /// Six images:
    /// 1 cat oc (safe, 9), 2 cat dog (safe, 3), 3 cat explicit (explicit, 8),
    /// 4 dog multi_word (questionable, 6), 5 untagged (unrated, 0),
    /// 6 cat dog oc multi_word (safe, 10).
    fn fixture() -> Fixture {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();

        let alice = db.create_user("alice").unwrap();
        let bob = db.create_user("bob").unwrap();
        db.set_user_filter(alice, "-explicit").unwrap();
        db.set_user_filter(bob, "oc").unwrap();

        let cat = db.create_tag("cat", "", alice).unwrap();
        let dog = db.create_tag("dog", "", alice).unwrap();
        let explicit = db.create_tag("explicit", "", alice).unwrap();
        let oc = db.create_tag("oc", "", alice).unwrap();
        let multi = db.create_tag("multi_word", "", alice).unwrap();
        let kitty = db.create_tag("kitty", "", alice).unwrap();
        db.alias_tag(kitty, cat).unwrap();

        let rows: [(&str, u64, &[u64], &str, i64); 6] = [
            ("sunset beach", alice, &[cat, oc], "safe", 9),
            ("two", alice, &[cat, dog], "safe", 3),
            ("three", alice, &[cat, explicit], "explicit", 8),
            ("four", bob, &[dog, multi], "questionable", 6),
            ("five", bob, &[], "unrated", 0),
            ("six", bob, &[cat, dog, oc, multi], "safe", 10),
        ];
        let mut images = Vec::new();
        for (i, (name, uploader, tags, rating, score)) in rows.iter().enumerate() {
            let id = db.create_image(name, &format!("img/{}.png", i + 1), *uploader).unwrap();
            for tag in tags.iter() {
                db.tag_image(id, *tag).unwrap();
            }
            db.set_image_rating(id, rating).unwrap();
            db.set_image_scores(id, *score, *score * 2, 2).unwrap();
            images.push(id);
        }

        let summer = db.create_collection("summer set", "", alice).unwrap();
        db.add_collection_member(summer, images[1], 5).unwrap();
        db.add_collection_member(summer, images[0], 1).unwrap();
        let winter = db.create_collection("winter", "", bob).unwrap();
        db.add_collection_member(winter, images[2], 0).unwrap();

        Fixture {
            db,
            alice,
            bob,
            images,
            summer,
            winter,
        }
    }

    impl Fixture {
        fn engine(&self) -> SearchEngine<'_, SqliteDb> {
            SearchEngine::new(&self.db)
        }

        /// Ids of an unwindowed image search, newest first.
        fn image_ids(&self, query: &str) -> Vec<u64> {
            let engine = self.engine();
            let preds = engine.parse_query(query, EntityKind::Image).unwrap();
            engine
                .search_images(&preds, 0, 0)
                .unwrap()
                .items
                .iter()
                .map(|i| i.id)
                .collect()
        }

        fn img(&self, n: usize) -> u64 {
            self.images[n - 1]
        }
    }

    #[test]
    fn test_parse_include_exclude_and_phrase() {
        let f = fixture();
        let preds = f.engine().parse_query(r#"cat -dog "multi word""#, EntityKind::Image).unwrap();
        let summary: Vec<(&str, bool, bool)> = preds
            .iter()
            .map(|p| (p.name.as_str(), p.exclude, p.exists))
            .collect();
        assert_eq!(
            summary,
            vec![("cat", false, true), ("dog", true, true), ("multi_word", false, true)]
        );

        assert_eq!(f.image_ids("cat -dog"), vec![f.img(3), f.img(1)]);
        assert_eq!(f.image_ids(r#""multi word" -cat"#), vec![f.img(4)]);
    }

    #[test]
    fn test_parse_dedupes_by_name() {
        let f = fixture();
        let preds = f.engine().parse_query("cat Cat -CAT", EntityKind::Image).unwrap();
        assert_eq!(preds.len(), 1);
        assert!(!preds[0].exclude);
    }

    #[test]
    fn test_alias_yields_alias_and_target() {
        let f = fixture();
        let preds = f.engine().parse_query("kitty", EntityKind::Image).unwrap();
        let names: Vec<&str> = preds.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["kitty", "cat"]);
        assert!(preds[0].is_alias);
        assert_eq!(f.image_ids("kitty"), f.image_ids("cat"));
        assert_eq!(f.image_ids("-kitty"), vec![f.img(5), f.img(4)]);
    }

    #[test]
    fn test_unknown_tags() {
        let f = fixture();
        let preds = f.engine().parse_query("ghost", EntityKind::Image).unwrap();
        assert!(!preds[0].exists);
        assert!(f.image_ids("cat ghost").is_empty());
        assert_eq!(f.image_ids("cat -ghost").len(), 4);
    }

    #[test]
    fn test_page_start_at_total_is_empty() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine.parse_query("cat", EntityKind::Image).unwrap();
        let result = engine.search_images(&preds, 4, 2).unwrap();
        assert!(result.items.is_empty());
        assert_eq!(result.total, 4);
        assert_eq!(result.page_stride, 2);
    }

    #[test]
    fn test_windows_concatenate_to_full_result() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine.parse_query("", EntityKind::Image).unwrap();
        let full = engine.search_images(&preds, 0, 0).unwrap();
        assert_eq!(full.total, 6);

        let mut paged = Vec::new();
        let mut start = 0;
        while start < full.total {
            let page = engine.search_images(&preds, start, 4).unwrap();
            assert_eq!(page.total, full.total);
            paged.extend(page.items);
            start += 4;
        }
        assert_eq!(paged, full.items);
    }

    #[test]
    fn test_excluded_score_inverts_comparator() {
        let f = fixture();
        let preds = f.engine().parse_query("-score:>5", EntityKind::Image).unwrap();
        assert_eq!(preds[0].meta.as_ref().unwrap().comparator, Comparator::Le);
        assert_eq!(f.image_ids("-score:>5"), vec![f.img(5), f.img(2)]);
        assert_eq!(f.image_ids("-score:>5 score:<9"), vec![f.img(5), f.img(2)]);
    }

    #[test]
    fn test_parse_dedupes_metatags_by_registry_name() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine.parse_query("score:>5 score:<3", EntityKind::Image).unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(preds[0].name, "score");
        assert_eq!(preds[0].meta.as_ref().unwrap().comparator, Comparator::Gt);

        let preds = engine.parse_query("averagescore:<3 -score:>5 rating:safe", EntityKind::Image).unwrap();
        let names: Vec<&str> = preds.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["score", "rating"]);
        assert_eq!(preds[0].meta.as_ref().unwrap().comparator, Comparator::Lt);
        assert!(!preds[0].exclude);
        assert_eq!(f.image_ids("score:>5 score:<9"), f.image_ids("score:>5"));
    }

    #[test]
    fn test_excluded_rating_is_not_equal() {
        let f = fixture();
        let preds = f.engine().parse_query("-rating:safe", EntityKind::Image).unwrap();
        assert_eq!(preds[0].meta.as_ref().unwrap().comparator, Comparator::Ne);
        assert_eq!(f.image_ids("-rating:safe"), vec![f.img(5), f.img(4), f.img(3)]);
    }

    #[test]
    fn test_exclude_tag_with_score_floor() {
        let f = fixture();
        assert_eq!(f.image_ids("-explicit score:>=8"), vec![f.img(6), f.img(1)]);
    }

    #[test]
    fn test_empty_query_with_stored_filter() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine
            .query_with_user_filter("", Some(f.bob), EntityKind::Image)
            .unwrap();
        assert_eq!(preds.len(), 1);
        assert!(preds[0].from_user_filter);
        let ids: Vec<u64> = engine
            .search_images(&preds, 0, 0)
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![f.img(6), f.img(1)]);
    }

    #[test]
    fn test_adhoc_term_overrides_filter() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine
            .query_with_user_filter("explicit", Some(f.alice), EntityKind::Image)
            .unwrap();
        assert_eq!(preds.len(), 1);
        assert!(!preds[0].exclude);
        assert!(!preds[0].from_user_filter);

        let adhoc = engine.parse_query("cat", EntityKind::Image).unwrap();
        let merged = engine
            .merge_with_user_filter(adhoc, "-explicit", EntityKind::Image)
            .unwrap();
        let ids: Vec<u64> = engine
            .search_images(&merged, 0, 0)
            .unwrap()
            .items
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![f.img(6), f.img(2), f.img(1)]);
    }

    #[test]
    fn test_adhoc_metatag_overrides_filter_metatag() {
        let f = fixture();
        let carol = f.db.create_user("carol").unwrap();
        f.db.set_user_filter(carol, "rating:safe -explicit").unwrap();
        let engine = f.engine();

        let preds = engine
            .query_with_user_filter("rating:explicit", Some(carol), EntityKind::Image)
            .unwrap();
        let names: Vec<(&str, bool)> = preds.iter().map(|p| (p.name.as_str(), p.from_user_filter)).collect();
        assert_eq!(names, vec![("rating", false), ("explicit", true)]);
        assert_eq!(
            preds[0].meta.as_ref().unwrap().value,
            MetaValue::Text("explicit".to_string())
        );
        assert_eq!(engine.search_images(&preds, 0, 0).unwrap().total, 0);

        let preds = engine
            .query_with_user_filter("rating:explicit explicit", Some(carol), EntityKind::Image)
            .unwrap();
        let result = engine.search_images(&preds, 0, 0).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].id, f.img(3));
    }

    #[test]
    fn test_tagcount_counts_live_associations() {
        let f = fixture();
        assert_eq!(
            f.image_ids("tagcount:<3"),
            vec![f.img(5), f.img(4), f.img(3), f.img(2), f.img(1)]
        );
        assert_eq!(f.image_ids("tagcount:0"), vec![f.img(5)]);
        assert_eq!(f.image_ids("-tagcount:<4"), vec![f.img(6)]);
    }

    #[test]
    fn test_incollection_and_uploader() {
        let f = fixture();
        assert_eq!(f.image_ids("incollection:yes"), vec![f.img(3), f.img(2), f.img(1)]);
        assert_eq!(f.image_ids("-incollection:yes"), vec![f.img(6), f.img(5), f.img(4)]);
        assert_eq!(f.image_ids("incollection:no"), vec![f.img(6), f.img(5), f.img(4)]);
        assert_eq!(f.image_ids("uploader:bob"), vec![f.img(6), f.img(5), f.img(4)]);
        assert_eq!(f.image_ids("-uploader:bob cat"), vec![f.img(3), f.img(2), f.img(1)]);
    }

    #[test]
    fn test_name_and_location_patterns() {
        let f = fixture();
        assert_eq!(f.image_ids("name:sunset"), vec![f.img(1)]);
        assert_eq!(f.image_ids("name:sunset__beach"), vec![f.img(1)]);
        assert_eq!(f.image_ids("location:img_4.png"), Vec::<u64>::new());
        assert_eq!(f.image_ids("location:4.png"), vec![f.img(4)]);
        assert_eq!(f.image_ids("-name:sunset").len(), 5);
    }

    #[test]
    fn test_ordersimilar_orders_by_distance() {
        let f = fixture();
        f.db.set_image_hashes(f.img(1), HashPair::new(0, 0)).unwrap();
        f.db.set_image_hashes(f.img(2), HashPair::new(0xFF, 0)).unwrap();
        f.db.set_image_hashes(f.img(3), HashPair::new(1, 0)).unwrap();

        assert_eq!(
            f.image_ids("ordersimilar:0.0"),
            vec![f.img(1), f.img(3), f.img(2), f.img(6), f.img(5), f.img(4)]
        );
        let by_image = format!("ordersimilar:{} cat", f.img(3));
        assert_eq!(f.image_ids(&by_image), vec![f.img(3), f.img(1), f.img(2), f.img(6)]);
    }

    #[test]
    fn test_collection_search() {
        let f = fixture();
        let engine = f.engine();
        let all = engine.search_collections(&[], 0, 0).unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].id, f.winter);
        let summer = &all.items[1];
        assert_eq!(summer.id, f.summer);
        assert_eq!(summer.members, 2);
        assert_eq!(summer.preview_location.as_deref(), Some("img/1.png"));

        let preds = engine.parse_query("dog", EntityKind::Collection).unwrap();
        let ids: Vec<u64> = engine
            .search_collections(&preds, 0, 0)
            .unwrap()
            .items
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![f.summer]);

        let preds = engine.parse_query("-explicit uploader:alice", EntityKind::Collection).unwrap();
        assert_eq!(engine.search_collections(&preds, 0, 0).unwrap().total, 1);

        let err = engine.parse_query("score:>1", EntityKind::Collection).unwrap_err();
        assert!(matches!(err, SearchError::MetaTagUnrecognized { .. }));
    }

    #[test]
    fn test_adjacent_within_results() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine.parse_query("cat", EntityKind::Image).unwrap();
        let adjacent = engine.get_adjacent(&preds, f.img(3)).unwrap();
        assert_eq!(adjacent, Adjacent { prev: Some(f.img(2)), next: Some(f.img(6)) });

        let adjacent = engine.get_adjacent(&preds, f.img(6)).unwrap();
        assert_eq!(adjacent.next, None);
        assert_eq!(adjacent.prev, Some(f.img(3)));

        assert!(matches!(engine.get_adjacent(&preds, 0), Err(SearchError::InvalidPivot)));
    }

    #[test]
    fn test_metatag_errors_abort_query() {
        let f = fixture();
        let engine = f.engine();
        assert!(matches!(
            engine.parse_query("cat colour:red", EntityKind::Image),
            Err(SearchError::MetaTagUnrecognized { .. })
        ));
        assert!(matches!(
            engine.parse_query("-ordersimilar:1.2", EntityKind::Image),
            Err(SearchError::ComparatorInversionUnsupported { .. })
        ));
        assert!(matches!(
            engine.parse_query("score:high", EntityKind::Image),
            Err(SearchError::ValueCoercionFailed { .. })
        ));
    }

    #[test]
    fn test_random_image() {
        let f = fixture();
        let engine = f.engine();
        let preds = engine.parse_query("explicit", EntityKind::Image).unwrap();
        assert_eq!(engine.random_image(&preds).unwrap().id, f.img(3));

        let preds = engine.parse_query("cat dog", EntityKind::Image).unwrap();
        let picked = engine.random_image(&preds).unwrap().id;
        assert!(picked == f.img(2) || picked == f.img(6));

        let preds = engine.parse_query("ghost", EntityKind::Image).unwrap();
        assert!(matches!(engine.random_image(&preds), Err(SearchError::NoResults)));
        let preds = engine.parse_query("cat explicit dog", EntityKind::Image).unwrap();
        assert!(matches!(engine.random_image(&preds), Err(SearchError::NoResults)));
    }

    #[test]
    fn test_unknown_user_filter_is_store_error() {
        let f = fixture();
        let err = f.engine().user_filter_predicates(999, EntityKind::Image).unwrap_err();
        assert!(matches!(err, SearchError::Store(_)));
    }
}
