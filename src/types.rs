use serde::{Deserialize, Serialize};

/// Identifier of a stored point. Assigned by the storage engine's
/// autoincrement, so always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointId(pub i64);

/// Identifier of a vantage point. Ids are dense and monotonically
/// increasing from 1; the partition codec relies on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VantagePointId(pub i64);

impl PointId {
    pub fn new(value: i64) -> Option<Self> {
        if value <= 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl VantagePointId {
    pub fn new(value: i64) -> Option<Self> {
        if value <= 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// One row of a query result: a stored item within the search radius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMatch {
    /// External name the item was inserted under (e.g. a file path)
    pub name: String,
    /// Exact distance from the query hash
    pub distance: u32,
}

/// Counts reported by the index, straight from the `mvp_counts` singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub points: i64,
    pub vantage_points: i64,
    pub items: i64,
}
