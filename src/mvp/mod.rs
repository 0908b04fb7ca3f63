//! Multi-vantage-point index over SQLite.
//!
//! A metric-space index for fixed-length bit vectors. Each vantage point
//! partitions the stored points into four concentric shells; a point's
//! shell indices are packed into a 64-bit partition key. Radius queries
//! compute which shells the query ball touches and scan only the covering
//! partitions, evaluating exact distances inside the storage engine
//! through a registered scalar function.
//!
//! The index is persistent and single-writer. One handle owns one
//! connection, its temp result table, and the cached vantage-point id
//! vector that the dynamic point-insert statement is generated from.

pub mod balance;
pub mod partition;
pub mod point;
pub mod query;
pub mod schema;
pub mod sql;
pub mod vantage;

use crate::error::{IndexError, IndexResult};
use crate::types::PointId;
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use std::panic::RefUnwindSafe;
use std::path::Path;
use std::sync::Arc;

/// The distance function over point values.
///
/// Must satisfy the metric axioms (non-negative, symmetric, zero exactly
/// on equal values, triangle inequality); query pruning is only sound for
/// a true metric. The storage engine may invoke it during statement
/// execution, so implementations must be pure.
pub trait Metric: Send + Sync + RefUnwindSafe + 'static {
    fn distance(&self, a: &[u8], b: &[u8]) -> u32;
}

/// One loaded vantage-point row
#[derive(Debug, Clone)]
pub(crate) struct VantagePoint {
    pub id: i64,
    pub bounds: [u32; 3],
    pub counts: [i64; 4],
    pub value: Vec<u8>,
}

impl VantagePoint {
    /// Shell index of a distance under this vantage point's boundaries:
    /// 3 if `d >= bound_3`, 2 if `d >= bound_2`, 1 if `d >= bound_1`,
    /// else 0. Non-monotone boundaries mean the row is corrupted.
    pub fn shell_of(&self, d: u32) -> IndexResult<usize> {
        let [b1, b2, b3] = self.bounds;
        if b1 > b2 || b2 > b3 {
            return Err(IndexError::InvalidShell {
                vp_id: self.id,
                distance: d,
                bounds: self.bounds,
            });
        }
        Ok(if d >= b3 {
            3
        } else if d >= b2 {
            2
        } else if d >= b1 {
            1
        } else {
            0
        })
    }
}

/// Load all vantage points in ascending id order
pub(crate) fn load_vantage_points(conn: &Connection) -> IndexResult<Vec<VantagePoint>> {
    let mut stmt = conn.prepare_cached(sql::SELECT_VPS)?;
    let rows = stmt.query_map([], |row| {
        Ok(VantagePoint {
            id: row.get(0)?,
            bounds: [row.get(1)?, row.get(2)?, row.get(3)?],
            counts: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
            value: row.get(8)?,
        })
    })?;
    let mut vps = Vec::new();
    for vp in rows {
        vps.push(vp?);
    }
    Ok(vps)
}

/// Handle to a persistent MVP index.
///
/// Not `Sync`: the statement cache and the cached vantage-point id vector
/// are per-handle mutable state.
pub struct MvpIndex<M: Metric> {
    conn: Connection,
    metric: Arc<M>,
    /// Ordered ids of the current vantage-point set; the point-insert
    /// statement text is regenerated whenever this changes
    vp_ids: Vec<i64>,
    insert_point_sql: String,
}

impl<M: Metric> MvpIndex<M> {
    /// Open or create an index at `path`
    pub fn open(path: &Path, metric: M) -> IndexResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, metric)
    }

    /// In-memory index, mainly for tests
    pub fn open_in_memory(metric: M) -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, metric)
    }

    fn from_connection(mut conn: Connection, metric: M) -> IndexResult<Self> {
        let metric = Arc::new(metric);
        register_distance_oracle(&conn, Arc::clone(&metric))?;
        schema::init(&mut conn)?;

        let mut index = Self {
            conn,
            metric,
            vp_ids: Vec::new(),
            insert_point_sql: sql::insert_point(&[]),
        };
        index.reload_vp_ids()?;
        Ok(index)
    }

    /// Number of stored points, from the cached counts row
    pub fn count_points(&self) -> IndexResult<i64> {
        let n = self
            .conn
            .query_row(sql::SELECT_POINT_COUNT, [], |row| row.get(0))?;
        Ok(n)
    }

    /// Number of vantage points, from the cached counts row
    pub fn count_vantage_points(&self) -> IndexResult<i64> {
        let n = self
            .conn
            .query_row(sql::SELECT_VP_COUNT, [], |row| row.get(0))?;
        Ok(n)
    }

    /// Read back the result table of the last `query`, sorted by distance
    pub fn query_results(&self) -> IndexResult<Vec<(PointId, u32)>> {
        let mut stmt = self.conn.prepare_cached(sql::SELECT_QUERY_RESULTS)?;
        let rows = stmt.query_map([], |row| Ok((PointId(row.get(0)?), row.get(1)?)))?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// The underlying storage connection. Exposed for layered tables
    /// (the item layer) and for state inspection in tests; writers must
    /// not touch the five index tables directly.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn metric(&self) -> &M {
        &self.metric
    }

    /// Refresh the cached vantage-point id vector from storage and, if it
    /// changed, regenerate the dynamic insert text and evict cached
    /// statements that name a superseded column set
    pub(crate) fn reload_vp_ids(&mut self) -> IndexResult<()> {
        let mut stmt = self.conn.prepare_cached(sql::SELECT_VP_IDS)?;
        let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        drop(stmt);

        if ids != self.vp_ids {
            self.insert_point_sql = sql::insert_point(&ids);
            self.vp_ids = ids;
            self.conn.flush_prepared_statement_cache();
        }
        Ok(())
    }
}

/// Register the user-supplied metric as the `mvp_distance(blob, blob)`
/// scalar function, so distance computations happen inside set-based
/// statements instead of row-by-row in application code. Installed once
/// per connection; torn down when the connection closes.
fn register_distance_oracle<M: Metric>(conn: &Connection, metric: Arc<M>) -> IndexResult<()> {
    conn.create_scalar_function(
        "mvp_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        move |ctx| {
            let a = ctx
                .get_raw(0)
                .as_blob()
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            let b = ctx
                .get_raw(1)
                .as_blob()
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            Ok(metric.distance(a, b) as i64)
        },
    )?;
    Ok(())
}
