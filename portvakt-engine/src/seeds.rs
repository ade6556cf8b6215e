//! Startup seed assembly for the firewall rule state.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipnetwork::IpNetwork;
use tracing::warn;

use portvakt_config::{load_ip_list, BanConfig};
use portvakt_store::BanStore;

use crate::error::EngineError;

/// Reserved/private IPv4 ranges whitelisted when local-network protection
/// is enabled: loopback, RFC1918, CGNAT, link-local, documentation,
/// benchmark and multicast blocks.
const RESERVED_V4_RANGES: &[&str] = &[
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "100.64.0.0/10",
    "169.254.0.0/16",
    "192.0.2.0/24",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "198.18.0.0/15",
    "224.0.0.0/4",
];

/// The reserved ranges as parsed networks.
pub fn reserved_networks() -> Vec<IpNetwork> {
    RESERVED_V4_RANGES
        .iter()
        .map(|cidr| cidr.parse().expect("reserved range table is well-formed"))
        .collect()
}

/// Blacklist seed: persisted bans still inside the retention window, plus
/// the user-supplied static blacklist.
pub fn blacklist_seed(
    store: &BanStore,
    config: &BanConfig,
    now_ms: i64,
) -> Result<Vec<IpNetwork>, EngineError> {
    let mut seed = BTreeSet::new();

    let cutoff_ms = now_ms - config.retention().as_millis() as i64;
    store.for_each_fresh(cutoff_ms, |record| {
        match record.ip.parse::<Ipv4Addr>() {
            Ok(ip) => {
                seed.insert(IpNetwork::from(std::net::IpAddr::V4(ip)));
            }
            Err(_) => warn!(ip = %record.ip, "unparseable IP in ban store, skipping"),
        }
    })?;

    if let Some(path) = &config.blacklist_file {
        seed.extend(load_ip_list(path).map_err(portvakt_config::ConfigError::from)?);
    }

    Ok(seed.into_iter().collect())
}

/// Whitelist seed: the user-supplied static whitelist, plus the reserved
/// ranges when local-network protection is enabled.
pub fn whitelist_seed(config: &BanConfig) -> Result<Vec<IpNetwork>, EngineError> {
    let mut seed = BTreeSet::new();

    if let Some(path) = &config.whitelist_file {
        seed.extend(load_ip_list(path).map_err(portvakt_config::ConfigError::from)?);
    }
    if config.protect_local_networks {
        seed.extend(reserved_networks());
    }

    Ok(seed.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_retention(retention_secs: u64) -> BanConfig {
        BanConfig {
            retention_secs,
            ..BanConfig::default()
        }
    }

    #[test]
    fn seed_excludes_records_outside_retention() {
        let store = BanStore::in_memory().unwrap();
        let day_ms: i64 = 24 * 3600 * 1000;
        let now_ms = 200 * day_ms;

        // 91 days old with 90 days retention: out. 10 days old: in.
        store
            .insert_if_absent("1.1.1.1", "port_scan:22", now_ms - 91 * day_ms)
            .unwrap();
        store
            .insert_if_absent("2.2.2.2", "port_scan:22", now_ms - 10 * day_ms)
            .unwrap();

        let config = config_with_retention(90 * 24 * 3600);
        let seed = blacklist_seed(&store, &config, now_ms).unwrap();
        assert_eq!(seed, vec!["2.2.2.2/32".parse().unwrap()]);
    }

    #[test]
    fn whitelist_seed_carries_reserved_ranges_when_enabled() {
        let mut config = BanConfig::default();
        config.protect_local_networks = true;
        let seed = whitelist_seed(&config).unwrap();
        assert!(seed.contains(&"10.0.0.0/8".parse().unwrap()));
        assert!(seed.contains(&"127.0.0.0/8".parse().unwrap()));
        assert!(seed.contains(&"224.0.0.0/4".parse().unwrap()));

        config.protect_local_networks = false;
        assert!(whitelist_seed(&config).unwrap().is_empty());
    }

    #[test]
    fn reserved_table_parses() {
        assert_eq!(reserved_networks().len(), 11);
    }
}
