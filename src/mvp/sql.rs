//! SQL text for the MVP index.
//!
//! Fixed statements live here as constants and run through the
//! connection's prepared-statement cache. Two statements cannot be fixed:
//! the point insert (its column list tracks the vantage-point set) and the
//! query-table fill (its `IN` list tracks the covering-partition count).
//! Their builders live here too, next to the text they vary from.

/// Everything `CREATE ... IF NOT EXISTS` so opening is idempotent.
/// `mvp_query` is a temp table: each connection owns its own result set.
pub const INIT_SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS mvp_counts (
    id INTEGER PRIMARY KEY,
    points INTEGER,
    vantage_points INTEGER
);
CREATE TABLE IF NOT EXISTS mvp_points (
    id INTEGER PRIMARY KEY,
    partition INTEGER,
    value BLOB UNIQUE
);
CREATE INDEX IF NOT EXISTS mvp_idx_points_partition ON mvp_points(partition);
CREATE TABLE IF NOT EXISTS mvp_vantage_points (
    id INTEGER PRIMARY KEY,
    bound_1 INTEGER,
    bound_2 INTEGER,
    bound_3 INTEGER,
    count_0 INTEGER,
    count_1 INTEGER,
    count_2 INTEGER,
    count_3 INTEGER,
    value BLOB UNIQUE
);
CREATE TEMP TABLE IF NOT EXISTS mvp_query (
    id INTEGER PRIMARY KEY,
    dist INTEGER
);
CREATE INDEX IF NOT EXISTS temp.mvp_idx_query_dist ON mvp_query(dist);
";

pub const COUNT_COUNTS_ROWS: &str = "SELECT COUNT(1) FROM mvp_counts";
pub const COUNT_POINTS_ROWS: &str = "SELECT COUNT(1) FROM mvp_points";
pub const COUNT_VPS_ROWS: &str = "SELECT COUNT(1) FROM mvp_vantage_points";

pub const INSERT_COUNTS: &str =
    "INSERT INTO mvp_counts(id, points, vantage_points) VALUES (1, ?1, ?2)";

pub const SELECT_POINT_COUNT: &str = "SELECT points FROM mvp_counts WHERE id = 1";
pub const SELECT_VP_COUNT: &str = "SELECT vantage_points FROM mvp_counts WHERE id = 1";

pub const INCREMENT_POINT_COUNT: &str =
    "UPDATE mvp_counts SET points = points + 1 WHERE id = 1";
pub const INCREMENT_VP_COUNT: &str =
    "UPDATE mvp_counts SET vantage_points = vantage_points + 1 WHERE id = 1";

pub const SELECT_POINT_BY_VALUE: &str = "SELECT id FROM mvp_points WHERE value = ?1";

pub const SELECT_VP_IDS: &str = "SELECT id FROM mvp_vantage_points ORDER BY id ASC";

pub const SELECT_VPS: &str = "\
SELECT id, bound_1, bound_2, bound_3, count_0, count_1, count_2, count_3, value
FROM mvp_vantage_points ORDER BY id ASC";

pub const SELECT_VP_EXISTS: &str = "SELECT id FROM mvp_vantage_points WHERE id = ?1";

pub const INSERT_VP: &str = "\
INSERT INTO mvp_vantage_points(bound_1, bound_2, bound_3, count_0, count_1, count_2, count_3, value)
VALUES (0, 0, 0, 0, 0, 0, 0, ?1) RETURNING id";

pub const UPDATE_VP_BALANCE: &str = "\
UPDATE mvp_vantage_points
SET bound_1 = ?1, bound_2 = ?2, bound_3 = ?3,
    count_0 = ?4, count_1 = ?5, count_2 = ?6, count_3 = ?7
WHERE id = ?8";

/// Shell-count increment for `insert_point`. The column name cannot be
/// bound, so each shell gets its own fixed statement.
pub fn increment_shell_count(shell: usize) -> &'static str {
    match shell {
        0 => "UPDATE mvp_vantage_points SET count_0 = count_0 + 1 WHERE id = ?1",
        1 => "UPDATE mvp_vantage_points SET count_1 = count_1 + 1 WHERE id = ?1",
        2 => "UPDATE mvp_vantage_points SET count_2 = count_2 + 1 WHERE id = ?1",
        _ => "UPDATE mvp_vantage_points SET count_3 = count_3 + 1 WHERE id = ?1",
    }
}

pub const DELETE_QUERY: &str = "DELETE FROM mvp_query";

pub const SELECT_QUERY_RESULTS: &str = "SELECT id, dist FROM mvp_query ORDER BY dist ASC";

/// A point in the fullest bucket: the codec is monotone in every shell
/// index, so the maximum key marks points in the outermost shell of every
/// vantage point. Ties broken randomly.
pub const SELECT_FARTHEST_VALUE: &str = "\
SELECT value FROM mvp_points
WHERE partition = (SELECT MAX(partition) FROM mvp_points)
ORDER BY RANDOM() LIMIT 1";

pub const SELECT_ALL_VALUES: &str = "SELECT value FROM mvp_points";

pub const SELECT_SAMPLE_VALUES: &str =
    "SELECT value FROM mvp_points ORDER BY RANDOM() LIMIT ?1";

/// Name of the per-vantage-point distance column
pub fn distance_column(vp_id: i64) -> String {
    format!("d{vp_id}")
}

/// DDL adding the distance column and its index for a new vantage point
pub fn add_distance_column(vp_id: i64) -> String {
    format!(
        "ALTER TABLE mvp_points ADD COLUMN d{vp_id} INTEGER;\n\
         CREATE INDEX IF NOT EXISTS mvp_idx_points_d{vp_id} ON mvp_points(d{vp_id});"
    )
}

/// Fill the new distance column for every existing point. The distance
/// oracle runs inside the storage engine, one call per row.
pub fn populate_distance_column(vp_id: i64) -> String {
    format!("UPDATE mvp_points SET d{vp_id} = mvp_distance(value, ?1)")
}

/// Percentile probe used by the balancer; `?1` is the 0-based rank
pub fn select_distance_at_rank(vp_id: i64) -> String {
    format!("SELECT d{vp_id} FROM mvp_points ORDER BY d{vp_id} ASC LIMIT 1 OFFSET ?1")
}

/// Truthful shell occupancy counts under candidate boundaries
/// `?1..?3 = bound_1..bound_3`
pub fn select_shell_counts(vp_id: i64) -> String {
    format!(
        "SELECT \
         SUM(CASE WHEN d{vp_id} < ?1 THEN 1 ELSE 0 END), \
         SUM(CASE WHEN d{vp_id} >= ?1 AND d{vp_id} < ?2 THEN 1 ELSE 0 END), \
         SUM(CASE WHEN d{vp_id} >= ?2 AND d{vp_id} < ?3 THEN 1 ELSE 0 END), \
         SUM(CASE WHEN d{vp_id} >= ?3 THEN 1 ELSE 0 END) \
         FROM mvp_points"
    )
}

/// Rewrite the two partition bits owned by `vp_id` for every point.
/// `?1` keeps the other bits, `?2..?4 = bound_3..bound_1`, `?5..?7` the
/// shifted shell contributions for shells 3..1.
pub fn repartition(vp_id: i64) -> String {
    format!(
        "UPDATE mvp_points SET partition = (partition & ?1) | \
         (CASE WHEN d{vp_id} >= ?2 THEN ?5 \
               WHEN d{vp_id} >= ?3 THEN ?6 \
               WHEN d{vp_id} >= ?4 THEN ?7 \
               ELSE 0 END)"
    )
}

/// Dynamic point insert: the column list names exactly the current
/// vantage-point set, in ascending id order. Binds are positional:
/// partition, value, then one distance per vantage point.
pub fn insert_point(vp_ids: &[i64]) -> String {
    let mut columns = String::from("partition, value");
    let mut values = String::from("?1, ?2");
    for (i, vp_id) in vp_ids.iter().enumerate() {
        columns.push_str(&format!(", d{vp_id}"));
        values.push_str(&format!(", ?{}", i + 3));
    }
    format!("INSERT INTO mvp_points({columns}) VALUES ({values}) RETURNING id")
}

/// Dynamic query fill: scan the covering partitions, compute exact
/// distances through the oracle, and keep rows within the radius. Binds
/// are positional: query value, radius, then the partition keys.
pub fn insert_query(partition_count: usize) -> String {
    let mut keys = String::new();
    for i in 0..partition_count {
        if i > 0 {
            keys.push_str(", ");
        }
        keys.push_str(&format!("?{}", i + 3));
    }
    format!(
        "INSERT INTO mvp_query(id, dist) \
         SELECT id, dist FROM \
         (SELECT id, mvp_distance(?1, value) AS dist FROM mvp_points \
          WHERE partition IN ({keys})) \
         WHERE dist <= ?2"
    )
}
