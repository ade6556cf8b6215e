//! Packet capture configuration.
//!
//! Defines which interface is watched, which decoy ports count as
//! scan bait, and which of the host's own addresses are excluded from
//! detection so outbound probes can never self-ban the host.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::error::ConfigError;
use crate::validation;

/// Packet capture configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    /// Network interface for live capture.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Run in promiscuous mode?
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,

    /// Capture snapshot length in bytes.
    #[validate(range(min = 128, max = 262144))]
    #[serde(default = "default_snaplen")]
    pub snaplen: usize,

    /// Monitored (decoy) port specs: a single port `"2222"` or an inclusive
    /// range `"8000-8100"`.
    #[validate(custom(function = validation::validate_port_specs))]
    #[serde(default)]
    pub monitored_ports: Vec<String>,

    /// The host's own egress addresses; traffic sourced from these is never
    /// reported.
    #[serde(default)]
    pub egress_ips: Vec<Ipv4Addr>,
}

fn default_interface() -> String {
    "eth0".into()
}

fn default_promiscuous() -> bool {
    true
}

fn default_snaplen() -> usize {
    1600
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            promiscuous: default_promiscuous(),
            snaplen: default_snaplen(),
            monitored_ports: Vec::new(),
            egress_ips: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Expand the configured port specs into a deduplicated port set.
    pub fn expand_ports(&self) -> Result<BTreeSet<u16>, ConfigError> {
        expand_port_specs(&self.monitored_ports)
    }
}

/// Expand `"N"` / `"N-M"` specs into the full, deduplicated port set.
pub(crate) fn expand_port_specs(specs: &[String]) -> Result<BTreeSet<u16>, ConfigError> {
    let mut ports = BTreeSet::new();
    for spec in specs {
        let (left, right) = parse_port_spec(spec)?;
        for port in left..=right {
            ports.insert(port);
        }
    }
    Ok(ports)
}

pub(crate) fn parse_port_spec(spec: &str) -> Result<(u16, u16), ConfigError> {
    let mut parts = spec.splitn(2, '-');
    let left = parts
        .next()
        .unwrap_or_default()
        .trim()
        .parse::<u16>()
        .map_err(|_| ConfigError::PortSpec(spec.to_string()))?;
    let right = match parts.next() {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::PortSpec(spec.to_string()))?,
        None => left,
    };
    if right < left {
        return Err(ConfigError::PortSpec(spec.to_string()));
    }
    Ok((left, right))
}
