//! Kernel firewall configuration.
//!
//! Names of the two address sets and the evaluation chain, plus operational
//! limits for the subprocess backend.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Firewall synchronizer configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct FirewallConfig {
    /// Name of the kernel address set holding banned sources.
    #[validate(custom(function = validation::validate_set_name))]
    #[serde(default = "default_blacklist_set")]
    pub blacklist_set: String,

    /// Name of the kernel address set holding exempted sources.
    #[validate(custom(function = validation::validate_set_name))]
    #[serde(default = "default_whitelist_set")]
    pub whitelist_set: String,

    /// Name of the evaluation chain hooked into the inbound path.
    #[validate(custom(function = validation::validate_set_name))]
    #[serde(default = "default_chain")]
    pub chain: String,

    /// Maximum elements per address set.
    #[validate(range(min = 1024, max = 16777216))]
    #[serde(default = "default_max_elements")]
    pub max_elements: u64,

    /// Deadline for a single backend command, in milliseconds.
    #[validate(range(min = 100, max = 60000))]
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_blacklist_set() -> String {
    "portvakt-black".into()
}

fn default_whitelist_set() -> String {
    "portvakt-white".into()
}

fn default_chain() -> String {
    "PORTVAKT".into()
}

fn default_max_elements() -> u64 {
    65536
}

fn default_command_timeout_ms() -> u64 {
    5000
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            blacklist_set: default_blacklist_set(),
            whitelist_set: default_whitelist_set(),
            chain: default_chain(),
            max_elements: default_max_elements(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}
