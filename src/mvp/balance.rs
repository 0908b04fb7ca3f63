//! Shell boundary balancing and index maintenance heuristics.

use super::{MvpIndex, Metric, load_vantage_points, partition, sql};
use crate::error::{IndexError, IndexResult};
use rusqlite::{Connection, params};

/// Below this point count percentile probes are meaningless; boundaries
/// stay at zero and every point sits in the outermost shell
pub const MIN_BALANCE_SAMPLE: i64 = 8;

/// Candidate sample size used by the auto-promotion heuristic
pub const DEFAULT_SAMPLE_SIZE: usize = 25;

/// Recompute one vantage point's boundaries and counts, then rewrite its
/// two partition bits for every stored point. Runs inside the caller's
/// transaction.
pub(crate) fn rebalance(conn: &Connection, vp_id: i64) -> IndexResult<()> {
    let n: i64 = {
        let mut stmt = conn.prepare_cached(sql::SELECT_POINT_COUNT)?;
        stmt.query_row([], |row| row.get(0))?
    };

    let (bounds, counts) = if n >= MIN_BALANCE_SAMPLE {
        let mut probe = conn.prepare(&sql::select_distance_at_rank(vp_id))?;
        let b1: i64 = probe.query_row([n / 4], |row| row.get(0))?;
        let b2: i64 = probe.query_row([n / 2], |row| row.get(0))?;
        let b3: i64 = probe.query_row([3 * n / 4], |row| row.get(0))?;

        // Percentile values can tie, collapsing a boundary and emptying
        // the shell below it; counting by shell keeps the stored counts
        // truthful either way
        let counts: [i64; 4] = {
            let mut stmt = conn.prepare(&sql::select_shell_counts(vp_id))?;
            stmt.query_row(params![b1, b2, b3], |row| {
                Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?])
            })?
        };
        ([b1, b2, b3], counts)
    } else {
        ([0, 0, 0], [0, 0, 0, n])
    };

    {
        let mut stmt = conn.prepare_cached(sql::UPDATE_VP_BALANCE)?;
        stmt.execute(params![
            bounds[0], bounds[1], bounds[2], counts[0], counts[1], counts[2], counts[3], vp_id
        ])?;
    }

    {
        let keep = !partition::mask(vp_id);
        let mut stmt = conn.prepare(&sql::repartition(vp_id))?;
        stmt.execute(params![
            keep,
            bounds[2],
            bounds[1],
            bounds[0],
            partition::bits(3, vp_id),
            partition::bits(2, vp_id),
            partition::bits(1, vp_id),
        ])?;
    }

    Ok(())
}

impl<M: Metric> MvpIndex<M> {
    /// Rebalance one vantage point: boundaries from the quartile
    /// distances, counts to match, partition bits repaired for every
    /// point. Atomic; idempotent on unchanged data.
    pub fn balance(&mut self, vp_id: i64) -> IndexResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(sql::SELECT_VP_EXISTS)?;
            stmt.query_row([vp_id], |row| row.get::<_, i64>(0))?;
        }
        rebalance(&tx, vp_id)?;
        tx.commit()?;
        Ok(())
    }

    /// Ids of vantage points whose shell occupancies drifted outside
    /// `N*(1 +/- threshold)/4`. Empty below `min_count` points.
    pub fn check_balance(&self, min_count: i64, threshold: f32) -> IndexResult<Vec<i64>> {
        let n = self.count_points()?;
        if n < min_count {
            return Ok(Vec::new());
        }

        let lower = n as f64 * (1.0 - threshold as f64) / 4.0;
        let upper = n as f64 * (1.0 + threshold as f64) / 4.0;

        let vps = load_vantage_points(&self.conn)?;
        Ok(vps
            .iter()
            .filter(|vp| {
                vp.counts
                    .iter()
                    .any(|&c| (c as f64) < lower || (c as f64) > upper)
            })
            .map(|vp| vp.id)
            .collect())
    }

    /// Rebalance every vantage point `check_balance` flags
    pub fn auto_balance(&mut self, min_count: i64, threshold: f32) -> IndexResult<()> {
        for vp_id in self.check_balance(min_count, threshold)? {
            self.balance(vp_id)?;
        }
        Ok(())
    }

    /// Grow the vantage-point set toward `ceil(log(N) / log(4*target))`,
    /// promoting the best candidate each round. Returns the final
    /// vantage-point count.
    pub fn auto_vantage_point(&mut self, target: i64) -> IndexResult<i64> {
        if target < 1 {
            return Err(IndexError::ConfigError {
                reason: format!("auto_vantage_point target must be >= 1, got {target}"),
            });
        }

        let n = self.count_points()?;
        let desired = desired_vantage_points(n, target);
        let mut current = self.count_vantage_points()?;

        while current < desired {
            let value = self.find_vantage_point(DEFAULT_SAMPLE_SIZE)?;
            match self.insert_vantage_point(&value) {
                Ok(_) => current += 1,
                // The best remaining candidate is already promoted;
                // another round would pick it again
                Err(IndexError::VantagePointExists) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(current)
    }
}

/// Vantage points wanted for `n` points at `target` points per partition,
/// capped by the partition codec
fn desired_vantage_points(n: i64, target: i64) -> i64 {
    if n <= 1 {
        return 0;
    }
    let desired = ((n as f64).ln() / ((4 * target) as f64).ln()).ceil() as i64;
    desired.clamp(0, partition::MAX_VANTAGE_POINTS as i64)
}
