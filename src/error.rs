//! Error types for the hashing and indexing subsystems.
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for index and database operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// The value is already registered as a vantage point.
    /// Callers that treat promotion as idempotent may ignore this.
    #[error("Vantage point already exists for this value")]
    VantagePointExists,

    /// An operation that needs at least one stored point ran against an
    /// empty index
    #[error("The index contains no points. Insert points before calling '{operation}'.")]
    EmptyIndex { operation: &'static str },

    /// The partition codec packs two bits per vantage point into a 64-bit
    /// key, which caps the index at 32 vantage points
    #[error("Vantage point capacity reached: the partition key supports at most {max} vantage points")]
    VantagePointCapacity { max: u32 },

    /// A computed shell index fell outside 0..=3, which means the distance
    /// function misbehaved or stored boundaries are corrupted
    #[error("Invalid shell for vantage point {vp_id}: distance {distance} with bounds {bounds:?}")]
    InvalidShell {
        vp_id: i64,
        distance: u32,
        bounds: [u32; 3],
    },

    /// The database was created with a different hash algorithm
    #[error("Hash algorithm mismatch: database uses '{stored}', requested '{requested}'")]
    HashTypeMismatch { stored: String, requested: String },

    /// Item layer errors
    #[error("Item '{name}' already exists")]
    ItemExists { name: String },

    #[error("Item '{name}' not found. Did you insert it first?")]
    ItemNotFound { name: String },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Storage errors are propagated verbatim; atomic groups roll back
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::VantagePointExists => "VANTAGE_POINT_EXISTS",
            Self::EmptyIndex { .. } => "EMPTY_INDEX",
            Self::VantagePointCapacity { .. } => "VANTAGE_POINT_CAPACITY",
            Self::InvalidShell { .. } => "INVALID_SHELL",
            Self::HashTypeMismatch { .. } => "HASH_TYPE_MISMATCH",
            Self::ItemExists { .. } => "ITEM_EXISTS",
            Self::ItemNotFound { .. } => "ITEM_NOT_FOUND",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::EmptyIndex { .. } => vec![
                "Insert at least one point with 'picdex insert' first",
                "Vantage points are chosen from stored points, so the index cannot be empty",
            ],
            Self::VantagePointCapacity { .. } => vec![
                "The index already has 32 vantage points; further promotion is not possible",
                "Query performance does not benefit from more vantage points at this scale",
            ],
            Self::InvalidShell { .. } => vec![
                "The transaction was rolled back, your index is in a consistent state",
                "Check that the distance function is a true metric over your hashes",
            ],
            Self::HashTypeMismatch { .. } => vec![
                "Open the database with the algorithm it was created with",
                "Or create a new database for the new algorithm",
            ],
            Self::ItemNotFound { .. } => {
                vec!["Check the name spelling; items are keyed by exact name"]
            }
            _ => vec![],
        }
    }
}

/// Errors specific to image decoding and hashing
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("PPM: {reason}")]
    PpmFormat { reason: String },

    #[error("PPM: unexpected end of stream")]
    PpmTruncated,

    #[error("Image must be square and single-channel for the DCT hash, got {height}x{width}x{channels}")]
    BadShape {
        height: usize,
        width: usize,
        channels: usize,
    },

    #[error("Unknown hash algorithm '{name}'. Supported: block, dct1, dct2, dct3, dct4")]
    UnknownAlgorithm { name: String },

    #[error("Invalid hex hash '{input}'")]
    InvalidHex { input: String },
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for hashing operations
pub type HashResult<T> = Result<T, HashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(
            IndexError::VantagePointExists.status_code(),
            "VANTAGE_POINT_EXISTS"
        );
        assert_eq!(
            IndexError::EmptyIndex {
                operation: "find_vantage_point"
            }
            .status_code(),
            "EMPTY_INDEX"
        );
        assert_eq!(
            IndexError::VantagePointCapacity { max: 32 }.status_code(),
            "VANTAGE_POINT_CAPACITY"
        );
    }

    #[test]
    fn test_invalid_shell_message_names_the_vantage_point() {
        let err = IndexError::InvalidShell {
            vp_id: 3,
            distance: 17,
            bounds: [4, 2, 9],
        };
        let msg = err.to_string();
        assert!(msg.contains("vantage point 3"));
        assert!(msg.contains("17"));
    }

    #[test]
    fn test_empty_index_has_suggestions() {
        let err = IndexError::EmptyIndex {
            operation: "find_vantage_point",
        };
        assert!(!err.recovery_suggestions().is_empty());
    }
}
