mod schema;
pub mod backend;
pub mod collections;
pub mod similarity;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use schema::SCHEMA;
pub use backend::{AssociationStore, TagCatalog};
pub use collections::CollectionSummary;
pub use similarity::{hamming_distance, HashPair};
pub use sqlite::SqliteDb;

/// Errors raised by a storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A row of the tag catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub uploader_id: u64,
    pub upload_time: Option<DateTime<Utc>>,
    /// Canonical tag this one points at, 0 when not an alias
    pub aliased_id: u64,
    pub is_alias: bool,
}

/// Image row as returned by a search page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub id: u64,
    pub name: String,
    pub location: String,
    pub uploader_id: u64,
    pub rating: String,
    pub score_average: i64,
}

/// SQL text plus its positional parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<rusqlite::types::Value>,
}

/// Parse a SQLite `CURRENT_TIMESTAMP` value ("YYYY-MM-DD HH:MM:SS").
fn parse_db_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .ok()
}
