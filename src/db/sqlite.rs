//! SQLite backend implementation.

use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::Path;

use super::backend::{AssociationStore, TagCatalog};
use super::schema::SCHEMA;
use super::similarity::{from_sql_bits, register_hamming, to_sql_bits, HashPair};
use super::{parse_db_timestamp, CollectionSummary, ImageSummary, SqlQuery, StoreError, Tag};

type Result<T> = std::result::Result<T, StoreError>;

const TAG_COLUMNS: &str = "id, name, description, uploader_id, upload_time, aliased_id, is_alias";

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        register_hamming(&conn)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ========================================================================
    // User operations
    // ========================================================================

    pub fn create_user(&self, name: &str) -> Result<u64> {
        self.conn.execute("INSERT INTO users (name) VALUES (?)", [name])?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    pub fn set_user_filter(&self, user_id: u64, filter: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE users SET search_filter = ? WHERE id = ?",
            rusqlite::params![filter, user_id as i64],
        )?;
        Ok(())
    }

    // ========================================================================
    // Tag operations
    // ========================================================================

    pub fn create_tag(&self, name: &str, description: &str, uploader_id: u64) -> Result<u64> {
        self.conn.execute(
            "INSERT INTO tags (name, description, uploader_id) VALUES (?, ?, ?)",
            rusqlite::params![name, description, uploader_id as i64],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    /// Point `alias_id` at `target_id`. Chains are not checked here.
    pub fn alias_tag(&self, alias_id: u64, target_id: u64) -> Result<()> {
        self.conn.execute(
            "UPDATE tags SET aliased_id = ?, is_alias = 1 WHERE id = ?",
            rusqlite::params![target_id as i64, alias_id as i64],
        )?;
        Ok(())
    }

    fn query_tags(&self, sql: &str, params: Vec<rusqlite::types::Value>) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let tags = stmt
            .query_map(params_from_iter(params.iter()), row_to_tag)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tags)
    }

    // ========================================================================
    // Image operations
    // ========================================================================

    pub fn create_image(&self, name: &str, location: &str, uploader_id: u64) -> Result<u64> {
        self.conn.execute(
            "INSERT INTO images (name, location, uploader_id) VALUES (?, ?, ?)",
            rusqlite::params![name, location, uploader_id as i64],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    pub fn set_image_rating(&self, image_id: u64, rating: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE images SET rating = ? WHERE id = ?",
            rusqlite::params![rating, image_id as i64],
        )?;
        Ok(())
    }

    pub fn set_image_scores(&self, image_id: u64, average: i64, total: i64, voters: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE images SET score_average = ?, score_total = ?, score_voters = ? WHERE id = ?",
            rusqlite::params![average, total, voters, image_id as i64],
        )?;
        Ok(())
    }

    pub fn tag_image(&self, image_id: u64, tag_id: u64) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?, ?)",
            rusqlite::params![image_id as i64, tag_id as i64],
        )?;
        Ok(())
    }

    pub fn set_image_hashes(&self, image_id: u64, hashes: HashPair) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO imaged_hashes (image_id, h_hash, v_hash) VALUES (?, ?, ?)
            ON CONFLICT(image_id) DO UPDATE SET
                h_hash = excluded.h_hash,
                v_hash = excluded.v_hash,
                hashed_at = CURRENT_TIMESTAMP
            "#,
            rusqlite::params![
                image_id as i64,
                to_sql_bits(hashes.h_hash),
                to_sql_bits(hashes.v_hash)
            ],
        )?;
        Ok(())
    }

    /// Images that still need a perceptual hash, as (id, location).
    pub fn images_without_hashes(&self) -> Result<Vec<(u64, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT i.id, i.location
            FROM images i
            LEFT JOIN imaged_hashes h ON h.image_id = i.id
            WHERE h.image_id IS NULL
            ORDER BY i.id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ========================================================================
    // Collection operations
    // ========================================================================

    pub fn create_collection(&self, name: &str, description: &str, uploader_id: u64) -> Result<u64> {
        self.conn.execute(
            "INSERT INTO collections (name, description, uploader_id) VALUES (?, ?, ?)",
            rusqlite::params![name, description, uploader_id as i64],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    pub fn add_collection_member(&self, collection_id: u64, image_id: u64, order_weight: i64) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO collection_members (collection_id, image_id, order_weight) VALUES (?, ?, ?)
            ON CONFLICT(collection_id, image_id) DO UPDATE SET order_weight = excluded.order_weight
            "#,
            rusqlite::params![collection_id as i64, image_id as i64, order_weight],
        )?;
        Ok(())
    }
}

impl TagCatalog for SqliteDb {
    fn tags_by_names(&self, names: &[String]) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM tags WHERE name IN ({})",
            TAG_COLUMNS,
            placeholders(names.len())
        );
        let params = names
            .iter()
            .map(|n| rusqlite::types::Value::Text(n.clone()))
            .collect();
        self.query_tags(&sql, params)
    }

    fn tags_by_ids(&self, ids: &[u64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM tags WHERE id IN ({})",
            TAG_COLUMNS,
            placeholders(ids.len())
        );
        let params = ids
            .iter()
            .map(|id| rusqlite::types::Value::Integer(*id as i64))
            .collect();
        self.query_tags(&sql, params)
    }

    fn user_id_by_name(&self, name: &str) -> Result<Option<u64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM users WHERE name = ? COLLATE NOCASE",
                [name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(|id| id as u64))
    }

    fn user_filter(&self, user_id: u64) -> Result<String> {
        let filter = self
            .conn
            .query_row(
                "SELECT search_filter FROM users WHERE id = ?",
                [user_id as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        filter.ok_or_else(|| StoreError::UnknownUser(user_id.to_string()))
    }
}

impl AssociationStore for SqliteDb {
    fn image_hashes(&self, image_id: u64) -> Result<Option<HashPair>> {
        let pair = self
            .conn
            .query_row(
                "SELECT h_hash, v_hash FROM imaged_hashes WHERE image_id = ?",
                [image_id as i64],
                |row| {
                    Ok(HashPair::new(
                        from_sql_bits(row.get(0)?),
                        from_sql_bits(row.get(1)?),
                    ))
                },
            )
            .optional()?;
        Ok(pair)
    }

    fn count_matches(&self, query: &SqlQuery) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            &query.sql,
            params_from_iter(query.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn fetch_id(&self, query: &SqlQuery) -> Result<Option<u64>> {
        let id = self
            .conn
            .query_row(&query.sql, params_from_iter(query.params.iter()), |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(id.map(|id| id as u64))
    }

    fn fetch_images(&self, query: &SqlQuery) -> Result<Vec<ImageSummary>> {
        let mut stmt = self.conn.prepare(&query.sql)?;
        let images = stmt
            .query_map(params_from_iter(query.params.iter()), |row| {
                Ok(ImageSummary {
                    id: row.get::<_, i64>(0)? as u64,
                    name: row.get(1)?,
                    location: row.get(2)?,
                    uploader_id: row.get::<_, i64>(3)? as u64,
                    rating: row.get(4)?,
                    score_average: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(images)
    }

    fn fetch_collections(&self, query: &SqlQuery) -> Result<Vec<CollectionSummary>> {
        let mut stmt = self.conn.prepare(&query.sql)?;
        let collections = stmt
            .query_map(params_from_iter(query.params.iter()), |row| {
                Ok(CollectionSummary {
                    id: row.get::<_, i64>(0)? as u64,
                    name: row.get(1)?,
                    preview_location: row.get(2)?,
                    members: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collections)
    }

    fn total_images(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn snapshot<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        // Deferred: the read snapshot is taken by the first statement in `f`
        let tx = self.conn.unchecked_transaction().map_err(StoreError::from)?;
        let out = f()?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    let upload_time: Option<String> = row.get(4)?;
    Ok(Tag {
        id: row.get::<_, i64>(0)? as u64,
        name: row.get(1)?,
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        uploader_id: row.get::<_, i64>(3)? as u64,
        upload_time: upload_time.as_deref().and_then(parse_db_timestamp),
        aliased_id: row.get::<_, i64>(5)? as u64,
        is_alias: row.get::<_, i64>(6)? != 0,
    })
}
