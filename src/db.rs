//! Hash database facade.
//!
//! Wraps the MVP index with an item layer: external names (usually file
//! paths) mapped to point ids, many-to-one, plus a small metadata table
//! recording which hash algorithm the database was created with. Points
//! are never deleted; removing an item only drops the name mapping.

use crate::debug_print;
use crate::error::{IndexError, IndexResult};
use crate::hash::Hamming;
use crate::mvp::MvpIndex;
use crate::types::{IndexStats, PointId, QueryMatch, VantagePointId};
use rusqlite::{ErrorCode, OptionalExtension, params};
use std::path::Path;

const INIT_ITEMS: &str = "\
CREATE TABLE IF NOT EXISTS mvp_items (
    id INTEGER PRIMARY KEY,
    point_id INTEGER,
    name TEXT UNIQUE,
    FOREIGN KEY(point_id) REFERENCES mvp_points(id)
);
CREATE INDEX IF NOT EXISTS mvp_idx_items_point ON mvp_items(point_id);
CREATE TABLE IF NOT EXISTS mvp_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

const INSERT_ITEM: &str = "INSERT INTO mvp_items(point_id, name) VALUES (?1, ?2)";
const SELECT_ITEM: &str = "SELECT id FROM mvp_items WHERE name = ?1";
const RENAME_ITEM: &str = "UPDATE mvp_items SET name = ?2 WHERE name = ?1";
const DELETE_ITEM: &str = "DELETE FROM mvp_items WHERE name = ?1";
const COUNT_ITEMS: &str = "SELECT COUNT(1) FROM mvp_items";

const SELECT_MATCHES: &str = "\
SELECT mvp_items.name, mvp_query.dist
FROM mvp_query JOIN mvp_items ON mvp_items.point_id = mvp_query.id
ORDER BY mvp_query.dist ASC, mvp_items.name ASC
LIMIT ?1";

const SELECT_META: &str = "SELECT value FROM mvp_meta WHERE key = ?1";
const INSERT_META: &str = "INSERT INTO mvp_meta(key, value) VALUES (?1, ?2)";

/// Strongly-typed metadata keys to avoid string literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaKey {
    /// Name of the hash algorithm the database was created with
    HashType,
}

impl MetaKey {
    fn as_str(&self) -> &'static str {
        match self {
            Self::HashType => "hash_type",
        }
    }
}

/// A persistent database of perceptual hashes and the items they belong to
pub struct HashDatabase {
    index: MvpIndex<Hamming>,
}

impl HashDatabase {
    /// Open or create a database at `path`
    pub fn open(path: &Path) -> IndexResult<Self> {
        let index = MvpIndex::open(path, Hamming)?;
        index.connection().execute_batch(INIT_ITEMS)?;
        Ok(Self { index })
    }

    /// In-memory database, mainly for tests
    pub fn open_in_memory() -> IndexResult<Self> {
        let index = MvpIndex::open_in_memory(Hamming)?;
        index.connection().execute_batch(INIT_ITEMS)?;
        Ok(Self { index })
    }

    /// Verify the database was created with the given hash algorithm.
    /// First use records the algorithm; later opens must match or fail,
    /// since hashes from different algorithms are not comparable.
    pub fn check_hash_type(&self, hash_type: &str) -> IndexResult<()> {
        let conn = self.index.connection();
        let stored: Option<String> = {
            let mut stmt = conn.prepare_cached(SELECT_META)?;
            stmt.query_row([MetaKey::HashType.as_str()], |row| row.get(0))
                .optional()?
        };
        match stored {
            None => {
                let mut stmt = conn.prepare_cached(INSERT_META)?;
                stmt.execute([MetaKey::HashType.as_str(), hash_type])?;
                Ok(())
            }
            Some(stored) if stored == hash_type => Ok(()),
            Some(stored) => Err(IndexError::HashTypeMismatch {
                stored,
                requested: hash_type.to_string(),
            }),
        }
    }

    /// Add an item under `name` with the given hash. Items with equal
    /// hashes share one point.
    pub fn insert(&mut self, hash: &[u8], name: &str) -> IndexResult<PointId> {
        if self.exists(name)? {
            return Err(IndexError::ItemExists {
                name: name.to_string(),
            });
        }

        let point_id = self.index.insert_point(hash)?;
        debug_print!("item '{}' -> point {}", name, point_id.value());

        let mut stmt = self.index.connection().prepare_cached(INSERT_ITEM)?;
        stmt.execute(params![point_id.value(), name])
            .map_err(|e| map_item_violation(e, name))?;
        Ok(point_id)
    }

    /// Find items whose hashes lie within `radius` of `hash`, closest
    /// first, at most `limit` of them
    pub fn query(&mut self, hash: &[u8], radius: u32, limit: usize) -> IndexResult<Vec<QueryMatch>> {
        self.index.query(hash, radius)?;

        let mut stmt = self.index.connection().prepare_cached(SELECT_MATCHES)?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(QueryMatch {
                name: row.get(0)?,
                distance: row.get(1)?,
            })
        })?;
        let mut matches = Vec::new();
        for row in rows {
            matches.push(row?);
        }
        Ok(matches)
    }

    /// Rename an item, keeping its hash
    pub fn rename(&mut self, old: &str, new: &str) -> IndexResult<()> {
        let mut stmt = self.index.connection().prepare_cached(RENAME_ITEM)?;
        let changed = stmt
            .execute(params![old, new])
            .map_err(|e| map_item_violation(e, new))?;
        if changed == 0 {
            return Err(IndexError::ItemNotFound {
                name: old.to_string(),
            });
        }
        Ok(())
    }

    /// Remove an item mapping. The underlying point stays; the index
    /// never deletes points.
    pub fn remove(&mut self, name: &str) -> IndexResult<()> {
        let mut stmt = self.index.connection().prepare_cached(DELETE_ITEM)?;
        let changed = stmt.execute([name])?;
        if changed == 0 {
            return Err(IndexError::ItemNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> IndexResult<bool> {
        let mut stmt = self.index.connection().prepare_cached(SELECT_ITEM)?;
        let found = stmt
            .query_row([name], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn stats(&self) -> IndexResult<IndexStats> {
        let items: i64 = self
            .index
            .connection()
            .query_row(COUNT_ITEMS, [], |row| row.get(0))?;
        Ok(IndexStats {
            points: self.index.count_points()?,
            vantage_points: self.index.count_vantage_points()?,
            items,
        })
    }

    // Index maintenance passthroughs

    pub fn add_vantage_point(&mut self, hash: &[u8]) -> IndexResult<VantagePointId> {
        self.index.insert_vantage_point(hash)
    }

    pub fn find_vantage_point(&self, sample_size: usize) -> IndexResult<Vec<u8>> {
        self.index.find_vantage_point(sample_size)
    }

    pub fn balance(&mut self, vp_id: i64) -> IndexResult<()> {
        self.index.balance(vp_id)
    }

    pub fn check_balance(&self, min_count: i64, threshold: f32) -> IndexResult<Vec<i64>> {
        self.index.check_balance(min_count, threshold)
    }

    pub fn auto_balance(&mut self, min_count: i64, threshold: f32) -> IndexResult<()> {
        self.index.auto_balance(min_count, threshold)
    }

    pub fn auto_vantage_point(&mut self, target: i64) -> IndexResult<i64> {
        self.index.auto_vantage_point(target)
    }
}

/// The only constraint on `mvp_items` is the unique name
fn map_item_violation(err: rusqlite::Error, name: &str) -> IndexError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            IndexError::ItemExists {
                name: name.to_string(),
            }
        }
        _ => IndexError::Storage(err),
    }
}
