//! Radius queries.

use super::{MvpIndex, Metric, VantagePoint, load_vantage_points, partition, sql};
use crate::error::{IndexError, IndexResult};
use rusqlite::types::Value;
use std::sync::Arc;

/// Shells of `vp` that the query ball `[d - radius, d + radius]` touches.
///
/// Shell ranges are `[0,b1) [b1,b2) [b2,b3) [b3,inf)`; zero-width shells
/// (collapsed boundaries) are skipped. The window is widened in i64 so a
/// small distance minus a large radius cannot wrap.
fn covering_shells(vp: &VantagePoint, d: u32, radius: u32) -> IndexResult<Vec<usize>> {
    let [b1, b2, b3] = vp.bounds;
    let lows = [0i64, b1 as i64, b2 as i64, b3 as i64];
    let highs = [b1 as i64, b2 as i64, b3 as i64, i64::MAX];

    let lo = d as i64 - radius as i64;
    let hi = d as i64 + radius as i64;

    let mut shells = Vec::with_capacity(4);
    for s in 0..4 {
        if lows[s] >= highs[s] {
            continue;
        }
        if hi >= lows[s] && lo < highs[s] {
            shells.push(s);
        }
    }
    // Every distance lies in some non-degenerate shell, so an empty set
    // means the stored boundaries are corrupted
    if shells.is_empty() {
        return Err(IndexError::InvalidShell {
            vp_id: vp.id,
            distance: d,
            bounds: vp.bounds,
        });
    }
    Ok(shells)
}

impl<M: Metric> MvpIndex<M> {
    /// Find all points within `radius` of `value`.
    ///
    /// Rewrites the handle's `mvp_query` table with one `(id, dist)` row
    /// per match and returns the row count; read the rows back with
    /// [`query_results`](Self::query_results). The scan touches only the
    /// partitions whose shells the query ball intersects (by the triangle
    /// inequality that set covers every possible match) and filters by
    /// exact distance inside the storage engine.
    pub fn query(&mut self, value: &[u8], radius: u32) -> IndexResult<i64> {
        let metric = Arc::clone(&self.metric);
        let tx = self.conn.transaction()?;

        let vps = load_vantage_points(&tx)?;

        let mut parts: Vec<i64> = vec![0];
        for vp in &vps {
            let d = metric.distance(&vp.value, value);
            let shells = covering_shells(vp, d, radius)?;
            if shells.len() == 1 {
                let bits = partition::bits(shells[0], vp.id);
                for p in &mut parts {
                    *p |= bits;
                }
            } else {
                let mut grown = Vec::with_capacity(parts.len() * shells.len());
                for &p in &parts {
                    for &s in &shells {
                        grown.push(p | partition::bits(s, vp.id));
                    }
                }
                parts = grown;
            }
        }

        {
            let mut stmt = tx.prepare_cached(sql::DELETE_QUERY)?;
            stmt.execute([])?;
        }

        // The IN-list length tracks the covering set, so this text is
        // regenerated per call rather than cached
        let inserted = {
            let text = sql::insert_query(parts.len());
            let mut stmt = tx.prepare(&text)?;
            let mut params: Vec<Value> = Vec::with_capacity(parts.len() + 2);
            params.push(Value::Blob(value.to_vec()));
            params.push(Value::Integer(radius as i64));
            for &p in &parts {
                params.push(Value::Integer(p));
            }
            stmt.execute(rusqlite::params_from_iter(params))?
        };

        tx.commit()?;
        Ok(inserted as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hamming;
    use crate::mvp::MvpIndex;

    const LADDER: [u8; 9] = [0x00, 0x01, 0x03, 0x07, 0x0F, 0x1F, 0x3F, 0x7F, 0xFF];

    #[test]
    fn test_query_on_empty_index() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        assert_eq!(index.query(&[0x00], 0).unwrap(), 0);
        assert!(index.query_results().unwrap().is_empty());
    }

    #[test]
    fn test_query_without_vantage_points_scans_everything() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        for v in LADDER {
            index.insert_point(&[v]).unwrap();
        }
        let count = index.query(&[0x00], 3).unwrap();
        assert_eq!(count, 4); // distances 0,1,2,3
    }

    #[test]
    fn test_query_with_vantage_point_prunes_but_stays_exact() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        for v in LADDER {
            index.insert_point(&[v]).unwrap();
        }
        index.insert_vantage_point(&[0x00]).unwrap();

        let count = index.query(&[0x00], 2).unwrap();
        assert_eq!(count, 3);

        let results = index.query_results().unwrap();
        let dists: Vec<u32> = results.iter().map(|&(_, d)| d).collect();
        assert_eq!(dists, vec![0, 1, 2]);
    }

    #[test]
    fn test_query_results_are_sorted_by_distance() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        for v in [0xFFu8, 0x00, 0x07, 0x01] {
            index.insert_point(&[v]).unwrap();
        }
        index.query(&[0x00], 8).unwrap();

        let results = index.query_results().unwrap();
        let dists: Vec<u32> = results.iter().map(|&(_, d)| d).collect();
        let mut sorted = dists.clone();
        sorted.sort_unstable();
        assert_eq!(dists, sorted);
    }

    #[test]
    fn test_query_overwrites_previous_results() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        for v in LADDER {
            index.insert_point(&[v]).unwrap();
        }
        index.query(&[0x00], 8).unwrap();
        assert_eq!(index.query_results().unwrap().len(), 9);

        index.query(&[0x00], 0).unwrap();
        assert_eq!(index.query_results().unwrap().len(), 1);
    }

    #[test]
    fn test_query_radius_larger_than_any_distance() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        for v in LADDER {
            index.insert_point(&[v]).unwrap();
        }
        index.insert_vantage_point(&[0x00]).unwrap();

        // The i64 window means a huge radius cannot wrap below zero
        let count = index.query(&[0xFF], u32::MAX).unwrap();
        assert_eq!(count, 9);
    }

    #[test]
    fn test_covering_shells_window() {
        let vp = VantagePoint {
            id: 1,
            bounds: [2, 4, 6],
            counts: [0; 4],
            value: vec![0],
        };
        assert_eq!(covering_shells(&vp, 0, 0).unwrap(), vec![0]);
        assert_eq!(covering_shells(&vp, 0, 2).unwrap(), vec![0, 1]);
        assert_eq!(covering_shells(&vp, 3, 1).unwrap(), vec![1, 2]);
        assert_eq!(covering_shells(&vp, 7, 0).unwrap(), vec![3]);
        assert_eq!(covering_shells(&vp, 4, 10).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_covering_shells_skips_degenerate() {
        let vp = VantagePoint {
            id: 1,
            bounds: [0, 0, 0],
            counts: [0; 4],
            value: vec![0],
        };
        // Unbalanced vantage point: shells 0..2 are zero-width
        assert_eq!(covering_shells(&vp, 5, 3).unwrap(), vec![3]);
        assert_eq!(covering_shells(&vp, 0, 0).unwrap(), vec![3]);
    }

    #[test]
    fn test_query_correct_in_unbalanced_state() {
        // Promote on a small table: bounds stay zero, everything in shell
        // 3, queries still exact
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        for v in [0x00u8, 0x01, 0x0F] {
            index.insert_point(&[v]).unwrap();
        }
        index.insert_vantage_point(&[0x00]).unwrap();

        assert_eq!(index.query(&[0x00], 1).unwrap(), 2);
    }
}
