//! Schema management for the five index tables.
//!
//! Opening is idempotent: base tables and indices are `IF NOT EXISTS`,
//! and the per-vantage-point distance columns added later by `ALTER
//! TABLE` survive in the file. On first use the cached counts row is
//! backfilled from full scans of the base tables.

use super::sql;
use crate::error::IndexResult;
use rusqlite::{Connection, params};

/// Create tables and indices, and seed `mvp_counts`, in one transaction
pub fn init(conn: &mut Connection) -> IndexResult<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(sql::INIT_SCHEMA)?;

    let seeded: i64 = tx.query_row(sql::COUNT_COUNTS_ROWS, [], |row| row.get(0))?;
    if seeded == 0 {
        let points: i64 = tx.query_row(sql::COUNT_POINTS_ROWS, [], |row| row.get(0))?;
        let vantage_points: i64 = tx.query_row(sql::COUNT_VPS_ROWS, [], |row| row.get(0))?;
        tx.execute(sql::INSERT_COUNTS, params![points, vantage_points])?;
    }

    tx.commit()?;
    Ok(())
}
