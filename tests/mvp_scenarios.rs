//! End-to-end scenarios for the MVP index: insertion, promotion,
//! balancing, and radius queries, checked against brute force.

use anyhow::Result;
use picdex::hash::{Hamming, hamming_distance};
use picdex::mvp::MvpIndex;
use picdex::types::PointId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Nine values whose Hamming distances from 0x00 are 0..=8
const LADDER: [u8; 9] = [0x00, 0x01, 0x03, 0x07, 0x0F, 0x1F, 0x3F, 0x7F, 0xFF];

/// 50 random-looking 8-byte values with pairwise distinct popcounts, so
/// distances from the zero vector are distinct and quartiles are crisp
fn distinct_weight_values(rng: &mut StdRng) -> Vec<Vec<u8>> {
    let mut weights: Vec<usize> = (1..=63).collect();
    weights.shuffle(rng);
    weights.truncate(50);

    weights
        .into_iter()
        .map(|w| {
            let mut bit_positions: Vec<usize> = (0..64).collect();
            bit_positions.shuffle(rng);
            let mut value = [0u8; 8];
            for &bit in bit_positions.iter().take(w) {
                value[bit / 8] |= 1 << (bit % 8);
            }
            value.to_vec()
        })
        .collect()
}

/// Brute-force ground truth for a radius query
fn within_radius(values: &[Vec<u8>], query: &[u8], radius: u32) -> usize {
    values
        .iter()
        .filter(|v| hamming_distance(v, query) <= radius)
        .count()
}

#[test]
fn scenario_empty_open() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut index = MvpIndex::open(&dir.path().join("index.db"), Hamming)?;

    assert_eq!(index.count_points()?, 0);
    assert_eq!(index.count_vantage_points()?, 0);
    assert_eq!(index.query(&[0x00], 0)?, 0);
    Ok(())
}

#[test]
fn scenario_dedup() -> Result<()> {
    let mut index = MvpIndex::open_in_memory(Hamming)?;

    assert_eq!(index.insert_point(&[0xAA])?, PointId(1));
    assert_eq!(index.insert_point(&[0xAA])?, PointId(1));
    assert_eq!(index.count_points()?, 1);
    Ok(())
}

#[test]
fn scenario_single_vantage_radius() -> Result<()> {
    let mut index = MvpIndex::open_in_memory(Hamming)?;
    for v in LADDER {
        index.insert_point(&[v])?;
    }
    index.insert_vantage_point(&[0x00])?;

    let count = index.query(&[0x00], 2)?;
    assert_eq!(count, 3);

    let results = index.query_results()?;
    let dists: Vec<u32> = results.iter().map(|&(_, d)| d).collect();
    assert_eq!(dists, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn scenario_promotion_preserves_query_results() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let values = distinct_weight_values(&mut rng);

    let mut index = MvpIndex::open_in_memory(Hamming)?;
    for v in &values {
        index.insert_point(v)?;
    }

    let query: Vec<u8> = values[17].clone();
    index.query(&query, 3)?;
    let before: HashSet<i64> = index
        .query_results()?
        .iter()
        .map(|&(id, _)| id.value())
        .collect();

    index.insert_vantage_point(&[0u8; 8])?;

    index.query(&query, 3)?;
    let after: HashSet<i64> = index
        .query_results()?
        .iter()
        .map(|&(id, _)| id.value())
        .collect();

    assert_eq!(before, after);
    assert_eq!(before.len(), within_radius(&values, &query, 3));
    Ok(())
}

#[test]
fn scenario_balance_counts_are_quartiles() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let values = distinct_weight_values(&mut rng);

    let mut index = MvpIndex::open_in_memory(Hamming)?;
    for v in &values {
        index.insert_point(v)?;
    }
    index.insert_vantage_point(&[0u8; 8])?;

    assert_eq!(index.count_points()?, 50);
    let counts = vantage_counts(&index, 1)?;
    assert_eq!(counts.iter().sum::<i64>(), 50);
    for (shell, &count) in counts.iter().enumerate() {
        assert!(
            (count - 12).abs() <= 1,
            "shell {shell} count {count} not within 1 of 12"
        );
    }
    Ok(())
}

#[test]
fn scenario_auto_promote_converges_and_caps() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(11);
    let values = distinct_weight_values(&mut rng);

    let mut index = MvpIndex::open_in_memory(Hamming)?;
    for v in &values {
        index.insert_point(v)?;
    }

    // ceil(ln(50)/ln(4)) = 3
    let mut last = index.auto_vantage_point(1)?;
    for _ in 0..5 {
        let next = index.auto_vantage_point(1)?;
        assert!(next >= last);
        last = next;
    }
    assert!(last >= 3);
    assert!(index.count_vantage_points()? <= 32);
    assert_eq!(index.auto_vantage_point(1)?, last, "converged calls are no-ops");
    Ok(())
}

#[test]
fn queries_stay_sound_through_interleaved_growth() -> Result<()> {
    // Insert, promote, and balance in interleaved order; after every
    // structural change, radius queries must still match brute force
    let mut rng = StdRng::seed_from_u64(23);
    let mut index = MvpIndex::open_in_memory(Hamming)?;
    let mut values: Vec<Vec<u8>> = Vec::new();

    for round in 0..4 {
        for _ in 0..20 {
            let value: Vec<u8> = (0..8).map(|_| rng.gen::<u8>()).collect();
            index.insert_point(&value)?;
            if !values.contains(&value) {
                values.push(value);
            }
        }

        if round % 2 == 0 {
            let candidate = index.find_vantage_point(10)?;
            // The candidate may already be promoted in later rounds
            let _ = index.insert_vantage_point(&candidate);
        } else {
            index.auto_balance(1, 0.25)?;
        }

        for _ in 0..5 {
            let query: Vec<u8> = (0..8).map(|_| rng.gen::<u8>()).collect();
            let radius = rng.gen_range(0..12);
            let count = index.query(&query, radius)?;
            assert_eq!(
                count as usize,
                within_radius(&values, &query, radius),
                "round {round}, radius {radius}"
            );

            // Every reported distance is exact and within the radius
            for (id, dist) in index.query_results()? {
                let stored = point_value(&index, id.value())?;
                assert_eq!(hamming_distance(&stored, &query), dist);
                assert!(dist <= radius);
            }
        }
    }

    verify_stored_invariants(&index)?;
    Ok(())
}

#[test]
fn index_survives_reopen() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    let path = dir.path().join("index.db");

    {
        let mut index = MvpIndex::open(&path, Hamming)?;
        for v in LADDER {
            index.insert_point(&[v])?;
        }
        index.insert_vantage_point(&[0x00])?;
    }

    let mut index = MvpIndex::open(&path, Hamming)?;
    assert_eq!(index.count_points()?, 9);
    assert_eq!(index.count_vantage_points()?, 1);

    // The reopened handle regenerates its dynamic statements from the
    // stored vantage-point set
    index.insert_point(&[0x11])?;
    assert_eq!(index.query(&[0x00], 2)?, 4); // 0x00, 0x01, 0x03, 0x11

    verify_stored_invariants(&index)?;
    Ok(())
}

#[test]
fn balance_is_stable_under_reruns() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(3);
    let mut index = MvpIndex::open_in_memory(Hamming)?;
    for _ in 0..30 {
        let value: Vec<u8> = (0..8).map(|_| rng.gen::<u8>()).collect();
        index.insert_point(&value)?;
    }
    index.insert_vantage_point(&[0u8; 8])?;

    let first = vantage_row(&index, 1)?;
    index.balance(1)?;
    index.balance(1)?;
    assert_eq!(vantage_row(&index, 1)?, first);
    Ok(())
}

// Helpers reading stored state directly

fn vantage_counts(index: &MvpIndex<Hamming>, vp_id: i64) -> Result<[i64; 4]> {
    let (_, counts) = vantage_row(index, vp_id)?;
    Ok(counts)
}

#[allow(clippy::type_complexity)]
fn vantage_row(index: &MvpIndex<Hamming>, vp_id: i64) -> Result<([i64; 3], [i64; 4])> {
    let row = index.connection().query_row(
        "SELECT bound_1, bound_2, bound_3, count_0, count_1, count_2, count_3 \
         FROM mvp_vantage_points WHERE id = ?1",
        [vp_id],
        |row| {
            Ok((
                [row.get(0)?, row.get(1)?, row.get(2)?],
                [row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?],
            ))
        },
    )?;
    Ok(row)
}

fn point_value(index: &MvpIndex<Hamming>, id: i64) -> Result<Vec<u8>> {
    let value = index.connection().query_row(
        "SELECT value FROM mvp_points WHERE id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(value)
}

/// Check the persisted invariants: stored distances match the metric,
/// shell counts match a recount, and every partition key equals the codec
/// of the point's shell assignment.
fn verify_stored_invariants(index: &MvpIndex<Hamming>) -> Result<()> {
    let conn = index.connection();

    struct Vp {
        id: i64,
        bounds: [u32; 3],
        counts: [i64; 4],
        value: Vec<u8>,
    }

    let vps: Vec<Vp> = {
        let mut stmt = conn.prepare(
            "SELECT id, bound_1, bound_2, bound_3, count_0, count_1, count_2, count_3, value \
             FROM mvp_vantage_points ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Vp {
                id: row.get(0)?,
                bounds: [row.get(1)?, row.get(2)?, row.get(3)?],
                counts: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
                value: row.get(8)?,
            })
        })?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    let points: Vec<(i64, i64, Vec<u8>)> = {
        let mut stmt = conn.prepare("SELECT id, partition, value FROM mvp_points")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    let total = points.len() as i64;

    for vp in &vps {
        let mut recount = [0i64; 4];
        for (id, key, value) in &points {
            let d = hamming_distance(&vp.value, value);

            // Stored distance column equals the metric
            let stored: u32 = conn.query_row(
                &format!("SELECT d{} FROM mvp_points WHERE id = ?1", vp.id),
                [id],
                |row| row.get(0),
            )?;
            assert_eq!(stored, d, "distance column for point {id} under vp {}", vp.id);

            let [b1, b2, b3] = vp.bounds;
            let shell = if d >= b3 {
                3
            } else if d >= b2 {
                2
            } else if d >= b1 {
                1
            } else {
                0
            };
            recount[shell] += 1;

            // Partition bits equal the codec of the shell assignment
            let stored_shell = (key >> (2 * (vp.id - 1))) & 0b11;
            assert_eq!(
                stored_shell, shell as i64,
                "partition bits for point {id} under vp {}",
                vp.id
            );
        }

        assert_eq!(vp.counts, recount, "shell counts for vp {}", vp.id);
        assert_eq!(vp.counts.iter().sum::<i64>(), total);
    }
    Ok(())
}
