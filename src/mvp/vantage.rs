//! Vantage-point promotion and selection.

use super::{MvpIndex, Metric, balance, partition, sql};
use crate::error::{IndexError, IndexResult};
use crate::types::VantagePointId;
use rusqlite::ErrorCode;

impl<M: Metric> MvpIndex<M> {
    /// Promote a value to a vantage point, returning the new id.
    ///
    /// Adds the `mvp_vantage_points` row, the `d{id}` distance column and
    /// its index, populates the column for every stored point through the
    /// distance oracle, and runs the initial balance. Between the column
    /// add and the balance the partition keys still reflect the old
    /// vantage-point set, so the whole operation is one transaction.
    pub fn insert_vantage_point(&mut self, value: &[u8]) -> IndexResult<VantagePointId> {
        let tx = self.conn.transaction()?;

        let current: i64 = {
            let mut stmt = tx.prepare_cached(sql::SELECT_VP_COUNT)?;
            stmt.query_row([], |row| row.get(0))?
        };
        if current >= partition::MAX_VANTAGE_POINTS as i64 {
            return Err(IndexError::VantagePointCapacity {
                max: partition::MAX_VANTAGE_POINTS,
            });
        }

        let vp_id: i64 = {
            let mut stmt = tx.prepare_cached(sql::INSERT_VP)?;
            stmt.query_row([value], |row| row.get(0))
                .map_err(map_unique_violation)?
        };
        {
            let mut stmt = tx.prepare_cached(sql::INCREMENT_VP_COUNT)?;
            stmt.execute([])?;
        }

        // The column list of mvp_points changes here; cached statements
        // are recompiled lazily by the engine, and the handle's dynamic
        // insert text is refreshed after commit
        tx.execute_batch(&sql::add_distance_column(vp_id))?;

        {
            let mut stmt = tx.prepare(&sql::populate_distance_column(vp_id))?;
            stmt.execute([value])?;
        }

        balance::rebalance(&tx, vp_id)?;

        tx.commit()?;
        self.reload_vp_ids()?;
        Ok(VantagePointId(vp_id))
    }

    /// Select a stored point value that would make a good vantage point.
    ///
    /// With existing vantage points: a point from the fullest partition
    /// (the codec is monotone in each shell index, so the maximum key
    /// holds points in the outermost shell of every vantage point), ties
    /// broken randomly. Without any: the point with the largest summed
    /// distance to a random sample of its peers, or to all of them when
    /// the table is no bigger than the sample.
    pub fn find_vantage_point(&self, sample_size: usize) -> IndexResult<Vec<u8>> {
        let n = self.count_points()?;
        if n == 0 {
            return Err(IndexError::EmptyIndex {
                operation: "find_vantage_point",
            });
        }

        if self.count_vantage_points()? > 0 {
            let mut stmt = self.conn.prepare_cached(sql::SELECT_FARTHEST_VALUE)?;
            return Ok(stmt.query_row([], |row| row.get(0))?);
        }

        let values: Vec<Vec<u8>> = if n <= sample_size as i64 {
            let mut stmt = self.conn.prepare_cached(sql::SELECT_ALL_VALUES)?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        } else {
            let mut stmt = self.conn.prepare_cached(sql::SELECT_SAMPLE_VALUES)?;
            let rows = stmt.query_map([sample_size as i64], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let mut best: Option<(u64, &Vec<u8>)> = None;
        for candidate in &values {
            let spread: u64 = values
                .iter()
                .map(|other| self.metric.distance(candidate, other) as u64)
                .sum();
            match best {
                Some((s, _)) if s >= spread => {}
                _ => best = Some((spread, candidate)),
            }
        }
        best.map(|(_, value)| value.clone())
            .ok_or(IndexError::EmptyIndex {
                operation: "find_vantage_point",
            })
    }
}

/// The only constraint on `mvp_vantage_points` is the unique value
fn map_unique_violation(err: rusqlite::Error) -> IndexError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            IndexError::VantagePointExists
        }
        _ => IndexError::Storage(err),
    }
}
