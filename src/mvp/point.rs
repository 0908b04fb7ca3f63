//! Point insertion.

use super::{MvpIndex, Metric, load_vantage_points, partition, sql};
use crate::error::IndexResult;
use crate::types::PointId;
use rusqlite::OptionalExtension;
use rusqlite::types::Value;
use std::sync::Arc;

impl<M: Metric> MvpIndex<M> {
    /// Insert a point value, returning its id.
    ///
    /// If a point with an equal value exists its id is returned with no
    /// side effects. Otherwise the point is stored together with its
    /// distance to every current vantage point and its partition key, the
    /// cached point count and the owning shell counts are incremented,
    /// all in one transaction.
    pub fn insert_point(&mut self, value: &[u8]) -> IndexResult<PointId> {
        let metric = Arc::clone(&self.metric);
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare_cached(sql::SELECT_POINT_BY_VALUE)?;
            if let Some(id) = stmt
                .query_row([value], |row| row.get::<_, i64>(0))
                .optional()?
            {
                return Ok(PointId(id));
            }
        }

        let vps = load_vantage_points(&tx)?;
        let ids: Vec<i64> = vps.iter().map(|vp| vp.id).collect();

        let mut key = 0i64;
        let mut params: Vec<Value> = Vec::with_capacity(vps.len() + 2);
        params.push(Value::Integer(0)); // partition, patched below
        params.push(Value::Blob(value.to_vec()));
        for vp in &vps {
            let d = metric.distance(&vp.value, value);
            let shell = vp.shell_of(d)?;
            key |= partition::bits(shell, vp.id);
            params.push(Value::Integer(d as i64));

            let mut stmt = tx.prepare_cached(sql::increment_shell_count(shell))?;
            stmt.execute([vp.id])?;
        }
        params[0] = Value::Integer(key);

        // The insert must name exactly the current distance columns; fall
        // back to a locally generated text if the cached id vector is
        // stale (it is refreshed after every promotion)
        let rebuilt;
        let insert_sql: &str = if ids == self.vp_ids {
            &self.insert_point_sql
        } else {
            rebuilt = sql::insert_point(&ids);
            &rebuilt
        };

        let id: i64 = {
            let mut stmt = tx.prepare_cached(insert_sql)?;
            stmt.query_row(rusqlite::params_from_iter(params), |row| row.get(0))?
        };

        {
            let mut stmt = tx.prepare_cached(sql::INCREMENT_POINT_COUNT)?;
            stmt.execute([])?;
        }

        tx.commit()?;
        Ok(PointId(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::hash::Hamming;
    use crate::mvp::MvpIndex;

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        assert_eq!(index.insert_point(&[0x01]).unwrap().value(), 1);
        assert_eq!(index.insert_point(&[0x02]).unwrap().value(), 2);
        assert_eq!(index.count_points().unwrap(), 2);
    }

    #[test]
    fn test_insert_dedups_by_value() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        let first = index.insert_point(&[0xAA]).unwrap();
        let second = index.insert_point(&[0xAA]).unwrap();
        assert_eq!(first, second);
        assert_eq!(index.count_points().unwrap(), 1);
    }

    #[test]
    fn test_insert_fills_distance_column_under_vantage_point() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        index.insert_point(&[0x00]).unwrap();
        index.insert_vantage_point(&[0x00]).unwrap();

        let id = index.insert_point(&[0x0F]).unwrap();
        let d: i64 = index
            .connection()
            .query_row(
                "SELECT d1 FROM mvp_points WHERE id = ?1",
                [id.value()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(d, 4);
    }

    #[test]
    fn test_insert_increments_shell_count() {
        let mut index = MvpIndex::open_in_memory(Hamming).unwrap();
        index.insert_point(&[0x00]).unwrap();
        index.insert_vantage_point(&[0x00]).unwrap();

        // With one point the vantage point is unbalanced: bounds are zero
        // and everything lands in shell 3
        index.insert_point(&[0xFF]).unwrap();
        let count_3: i64 = index
            .connection()
            .query_row(
                "SELECT count_3 FROM mvp_vantage_points WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count_3, 2);
    }
}
