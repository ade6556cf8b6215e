//! Ban lifecycle policy.
//!
//! Retention window, sweep cadence, view mode, local-network protection and
//! the user-supplied static list files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Ban lifecycle configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct BanConfig {
    /// How long a banned IP stays banned after it was last seen, in seconds.
    #[validate(range(min = 60, max = 315360000))]
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Interval between expiry sweeps, in seconds.
    #[validate(range(min = 5, max = 86400))]
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Compute and log ban decisions without touching the firewall.
    #[serde(default)]
    pub view_mode: bool,

    /// Whitelist the reserved/private IPv4 ranges at startup.
    #[serde(default = "default_protect_local_networks")]
    pub protect_local_networks: bool,

    /// Optional static blacklist file (one IP or CIDR per line).
    #[serde(default)]
    pub blacklist_file: Option<PathBuf>,

    /// Optional static whitelist file (one IP or CIDR per line).
    #[serde(default)]
    pub whitelist_file: Option<PathBuf>,
}

fn default_retention_secs() -> u64 {
    // 90 days
    90 * 24 * 3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_protect_local_networks() -> bool {
    true
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            view_mode: false,
            protect_local_networks: default_protect_local_networks(),
            blacklist_file: None,
            whitelist_file: None,
        }
    }
}

impl BanConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
