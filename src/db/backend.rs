//! Storage collaborator traits consumed by the search engine.
//!
//! The engine never owns data. Everything it reads comes through these two
//! traits so that the resolver and interpreter can be exercised against an
//! in-memory catalog and the compiled queries against any SQL store that
//! understands the schema in [`super::SCHEMA`].

use super::{CollectionSummary, HashPair, ImageSummary, SqlQuery, StoreError, Tag};

/// Read access to the tag catalog and per-user search settings.
pub trait TagCatalog {
    /// Bulk lookup by exact (already normalized) name. Unknown names are
    /// simply absent from the result.
    fn tags_by_names(&self, names: &[String]) -> Result<Vec<Tag>, StoreError>;

    /// Bulk lookup by id. Unknown ids are absent from the result.
    fn tags_by_ids(&self, ids: &[u64]) -> Result<Vec<Tag>, StoreError>;

    /// Resolve a user name to its id
    fn user_id_by_name(&self, name: &str) -> Result<Option<u64>, StoreError>;

    /// Raw persisted filter query of a user (empty when none is set)
    fn user_filter(&self, user_id: u64) -> Result<String, StoreError>;
}

/// Read access to entity/tag associations and execution of compiled queries.
pub trait AssociationStore {
    /// Perceptual hash pair of an image, if it has been hashed
    fn image_hashes(&self, image_id: u64) -> Result<Option<HashPair>, StoreError>;

    /// Run a query whose single column is a count.
    fn count_matches(&self, query: &SqlQuery) -> Result<u64, StoreError>;

    /// Run a query selecting a single id column, returning the first row if any.
    fn fetch_id(&self, query: &SqlQuery) -> Result<Option<u64>, StoreError>;

    /// Run a query selecting `id, name, location, uploader_id, rating, score_average`.
    fn fetch_images(&self, query: &SqlQuery) -> Result<Vec<ImageSummary>, StoreError>;

    /// Run a query selecting `id, name, preview_location, members`.
    fn fetch_collections(&self, query: &SqlQuery) -> Result<Vec<CollectionSummary>, StoreError>;

    /// Total number of images in the catalog
    fn total_images(&self) -> Result<u64, StoreError>;

    /// Run `f` so that every read it issues observes the same data snapshot.
    fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<StoreError>;
}
