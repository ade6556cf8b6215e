//! Admission filter extension point.
//!
//! Filters run on every scan event before the admission algorithm; any
//! filter can suppress an event. The controller carries no filters by
//! default, which is the pass-through configuration.

use ipnetwork::IpNetwork;
use std::net::IpAddr;

use portvakt_core::ScanEvent;

/// One admission rule. `admit` returning `false` suppresses the event.
pub trait EventFilter: Send {
    fn name(&self) -> &'static str;
    fn admit(&self, event: &ScanEvent) -> bool;
}

/// Suppresses events whose source falls inside any of the given networks.
pub struct NetworkFilter {
    networks: Vec<IpNetwork>,
}

impl NetworkFilter {
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }
}

impl EventFilter for NetworkFilter {
    fn name(&self) -> &'static str {
        "network_filter"
    }

    fn admit(&self, event: &ScanEvent) -> bool {
        let src = IpAddr::V4(event.src_ip);
        !self.networks.iter().any(|net| net.contains(src))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portvakt_core::ScanEventKind;
    use std::net::Ipv4Addr;

    fn event(src: &str) -> ScanEvent {
        ScanEvent {
            kind: ScanEventKind::PortScan,
            timestamp_ms: 1,
            src_ip: src.parse::<Ipv4Addr>().unwrap(),
            src_port: 40000,
            dst_ip: Ipv4Addr::new(192, 0, 2, 1),
            dst_port: 22,
        }
    }

    #[test]
    fn suppresses_listed_networks_only() {
        let filter = NetworkFilter::new(vec!["10.0.0.0/8".parse().unwrap()]);
        assert!(!filter.admit(&event("10.1.2.3")));
        assert!(filter.admit(&event("203.0.113.5")));
    }
}
