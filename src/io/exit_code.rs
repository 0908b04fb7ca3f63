//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed, results found (or no results is acceptable)
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - critical failure that should halt automation
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::{HashError, IndexError};

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Entity not found but command executed successfully (code 3)
    NotFound = 3,

    /// Failed to decode or hash an image (code 4)
    HashError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Database state conflicts with the request (code 7)
    Conflict = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Convert an `IndexError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_index_error(error: &IndexError) -> Self {
        match error {
            IndexError::ItemNotFound { .. } | IndexError::EmptyIndex { .. } => ExitCode::NotFound,

            IndexError::ItemExists { .. }
            | IndexError::VantagePointExists
            | IndexError::HashTypeMismatch { .. } => ExitCode::Conflict,

            IndexError::ConfigError { .. } => ExitCode::ConfigError,

            // Consistency failures should halt automation
            IndexError::InvalidShell { .. } | IndexError::VantagePointCapacity { .. } => {
                ExitCode::BlockingError
            }

            IndexError::Storage(_) => ExitCode::GeneralError,
        }
    }

    pub fn from_hash_error(error: &HashError) -> Self {
        match error {
            HashError::FileRead { .. } => ExitCode::IoError,
            _ => ExitCode::HashError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::HashError => "Hash error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::Conflict => "Conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as u8, 0);
        assert_eq!(ExitCode::GeneralError as u8, 1);
        assert_eq!(ExitCode::BlockingError as u8, 2);
        assert_eq!(ExitCode::NotFound as u8, 3);
    }

    #[test]
    fn test_is_success() {
        assert!(ExitCode::Success.is_success());
        assert!(!ExitCode::NotFound.is_success());
        assert!(!ExitCode::GeneralError.is_success());
    }

    #[test]
    fn test_is_blocking() {
        assert!(ExitCode::BlockingError.is_blocking());
        assert!(!ExitCode::Success.is_blocking());
        assert!(!ExitCode::NotFound.is_blocking());
    }

    #[test]
    fn test_index_error_mapping() {
        assert_eq!(
            ExitCode::from_index_error(&IndexError::ItemNotFound {
                name: "x".to_string()
            }),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_index_error(&IndexError::VantagePointCapacity { max: 32 }),
            ExitCode::BlockingError
        );
    }
}
