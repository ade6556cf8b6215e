//! # Portvakt Configuration System
//!
//! Hierarchical configuration for the portvakt daemon. One validated
//! configuration struct is built before any component is created; nothing
//! downstream re-reads files or environment variables.
//!
//! ## Features
//! - **Unified Configuration**: Single source of truth across all components
//! - **Validation**: Runtime validation of critical parameters
//! - **Environment Awareness**: `PORTVAKT_*` variables override file values

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod ban;
mod capture;
mod error;
mod firewall;
mod lists;
mod store;
mod telemetry;
mod validation;

pub use ban::BanConfig;
pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use firewall::FirewallConfig;
pub use lists::{load_ip_list, parse_ip_list, IpListError};
pub use store::StoreConfig;
pub use telemetry::TelemetryConfig;

/// Top-level configuration container for all portvakt components.
#[derive(Debug, Serialize, Deserialize, Validate, Default)]
pub struct PortvaktConfig {
    /// Packet capture parameters (interface, decoy ports, egress addresses).
    #[validate(nested)]
    pub capture: CaptureConfig,

    /// Kernel firewall parameters (set and chain names, timeouts).
    #[validate(nested)]
    pub firewall: FirewallConfig,

    /// Ban-record persistence parameters.
    #[validate(nested)]
    pub store: StoreConfig,

    /// Ban lifecycle policy (retention, sweep cadence, view mode).
    #[validate(nested)]
    pub ban: BanConfig,

    /// Telemetry and observability configuration.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl PortvaktConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/portvakt.yaml` - base settings. If missing, defaults are used.
    /// 3. `PORTVAKT_*` environment variables (`__` separates nesting).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(PortvaktConfig::default()));

        if Path::new("config/portvakt.yaml").exists() {
            figment = figment.merge(Yaml::file("config/portvakt.yaml"));
        }

        figment
            .merge(Env::prefixed("PORTVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(
                path.to_string_lossy().to_string(),
            )));
        }

        Figment::from(Serialized::defaults(PortvaktConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("PORTVAKT_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_validation() {
        let config = PortvaktConfig::default();
        config.validate().expect("Default config should validate");
    }

    #[test]
    fn environment_override() {
        // Jail scopes the env var and serializes against other env users.
        figment::Jail::expect_with(|jail| {
            jail.set_env("PORTVAKT_BAN__RETENTION_SECS", "3600");
            let config = PortvaktConfig::load().expect("env override should load");
            assert_eq!(config.ban.retention_secs, 3600);
            Ok(())
        });
    }
}
