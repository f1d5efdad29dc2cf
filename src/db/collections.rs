//! Types for collection search results.

use serde::Serialize;

/// A collection (ordered group of images) as returned by a search page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub id: u64,
    pub name: String,
    /// Location of the member with the lowest order weight
    pub preview_location: Option<String>,
    pub members: u64,
}
