//! Configuration module for the image hash database.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `PICDEX_` and use double
//! underscores to separate nested levels:
//! - `PICDEX_HASH__ALGORITHM=dct2` sets `hash.algorithm`
//! - `PICDEX_INDEX__BALANCE_THRESHOLD=0.5` sets `index.balance_threshold`
//! - `PICDEX_DEBUG=true` sets `debug`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

static GLOBAL_DEBUG: AtomicBool = AtomicBool::new(false);

/// Record the debug flag where `debug_print!` can reach it without
/// threading `Settings` through every call site
pub fn init_global_debug(enabled: bool) {
    GLOBAL_DEBUG.store(enabled, Ordering::Relaxed);
}

pub fn is_global_debug_enabled() -> bool {
    GLOBAL_DEBUG.load(Ordering::Relaxed)
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the hash database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Hashing configuration
    #[serde(default)]
    pub hash: HashConfig,

    /// Index maintenance configuration
    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HashConfig {
    /// Hash algorithm: "block" or "dct1".."dct4"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Working size images are reduced to before hashing
    #[serde(default = "default_preprocess_size")]
    pub preprocess_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Minimum point count before auto-balance considers rebalancing
    #[serde(default = "default_balance_min_count")]
    pub balance_min_count: i64,

    /// Fractional imbalance tolerated before a vantage point is rebalanced
    #[serde(default = "default_balance_threshold")]
    pub balance_threshold: f32,

    /// Candidate sample size for vantage point selection
    #[serde(default = "default_vantage_sample_size")]
    pub vantage_sample_size: usize,

    /// Target points-per-partition used to size the vantage point set
    #[serde(default = "default_auto_vantage_target")]
    pub auto_vantage_target: i64,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_db_path() -> PathBuf {
    PathBuf::from("picdex.db")
}
fn default_false() -> bool {
    false
}
fn default_algorithm() -> String {
    "block".to_string()
}
fn default_preprocess_size() -> usize {
    128
}
fn default_balance_min_count() -> i64 {
    128
}
fn default_balance_threshold() -> f32 {
    0.25
}
fn default_vantage_sample_size() -> usize {
    25
}
fn default_auto_vantage_target() -> i64 {
    64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            db_path: default_db_path(),
            debug: false,
            hash: HashConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            preprocess_size: default_preprocess_size(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            balance_min_count: default_balance_min_count(),
            balance_threshold: default_balance_threshold(),
            vantage_sample_size: default_vantage_sample_size(),
            auto_vantage_target: default_auto_vantage_target(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from("picdex.toml")
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Layer in environment variables with PICDEX_ prefix
            // Use double underscore (__) to separate nested levels
            .merge(Env::prefixed("PICDEX_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
