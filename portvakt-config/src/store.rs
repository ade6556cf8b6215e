//! Ban-record persistence configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Persistence configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Page size for range scans over the ban table.
    #[validate(range(min = 16, max = 10000))]
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_path() -> PathBuf {
    PathBuf::from("portvakt.db")
}

fn default_page_size() -> usize {
    256
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            page_size: default_page_size(),
        }
    }
}
