//! In-process firewall backend.
//!
//! Models the kernel state (named address sets plus one wired chain) and
//! implements the four-rule evaluation order, so synchronizer and
//! controller behavior is testable without root or a kernel.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::backend::{FirewallBackend, FirewallError};

/// Outcome of evaluating one packet against the installed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Source matched the whitelist; local evaluation terminated.
    Exempt,
    /// Traffic of an established/related session.
    Allowed,
    /// Source matched the blacklist.
    Dropped,
    /// No rule matched; host policy decides.
    Fallthrough,
}

#[derive(Debug, Clone)]
struct ChainWiring {
    whitelist_set: String,
    blacklist_set: String,
}

/// Backend keeping all state in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    sets: HashMap<String, BTreeSet<IpNetwork>>,
    chain: Option<(String, ChainWiring)>,
    fail_next_add: bool,
    add_entry_calls: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure for the next `add_entry` call.
    pub fn fail_next_add(&mut self) {
        self.fail_next_add = true;
    }

    /// Number of `add_entry` calls seen, including failed ones.
    pub fn add_entry_calls(&self) -> usize {
        self.add_entry_calls
    }

    /// Membership snapshot of a set; empty when the set does not exist.
    pub fn members(&self, set: &str) -> Vec<IpNetwork> {
        self.sets
            .get(set)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn set_exists(&self, set: &str) -> bool {
        self.sets.contains_key(set)
    }

    pub fn chain_installed(&self) -> bool {
        self.chain.is_some()
    }

    /// Evaluate a packet source against the installed chain in rule order.
    pub fn evaluate(&self, src: IpAddr, established: bool) -> Verdict {
        let Some((_, wiring)) = &self.chain else {
            return Verdict::Fallthrough;
        };
        if self.set_contains(&wiring.whitelist_set, src) {
            return Verdict::Exempt;
        }
        if established {
            return Verdict::Allowed;
        }
        if self.set_contains(&wiring.blacklist_set, src) {
            return Verdict::Dropped;
        }
        Verdict::Fallthrough
    }

    fn set_contains(&self, set: &str, ip: IpAddr) -> bool {
        self.sets
            .get(set)
            .map(|entries| entries.iter().any(|net| net.contains(ip)))
            .unwrap_or(false)
    }

    fn set_mut(&mut self, set: &str) -> Result<&mut BTreeSet<IpNetwork>, FirewallError> {
        self.sets
            .get_mut(set)
            .ok_or(FirewallError::AlreadyAbsent)
    }
}

impl FirewallBackend for MemoryBackend {
    fn create_set(&mut self, set: &str) -> Result<(), FirewallError> {
        self.sets.entry(set.to_string()).or_default();
        Ok(())
    }

    fn destroy_set(&mut self, set: &str) -> Result<(), FirewallError> {
        match self.sets.remove(set) {
            Some(_) => Ok(()),
            None => Err(FirewallError::AlreadyAbsent),
        }
    }

    fn add_entry(&mut self, set: &str, entry: IpNetwork) -> Result<(), FirewallError> {
        self.add_entry_calls += 1;
        if self.fail_next_add {
            self.fail_next_add = false;
            return Err(FirewallError::CommandFailed {
                program: "memory".into(),
                args: vec!["add".into(), set.into(), entry.to_string()],
                detail: "injected failure".into(),
            });
        }
        self.set_mut(set)?.insert(entry);
        Ok(())
    }

    fn remove_entry(&mut self, set: &str, entry: IpNetwork) -> Result<(), FirewallError> {
        if !self.set_mut(set)?.remove(&entry) {
            return Err(FirewallError::AlreadyAbsent);
        }
        Ok(())
    }

    fn load_entries(&mut self, set: &str, entries: &[IpNetwork]) -> Result<(), FirewallError> {
        let target = self.set_mut(set)?;
        for entry in entries {
            target.insert(*entry);
        }
        Ok(())
    }

    fn swap_sets(&mut self, first: &str, second: &str) -> Result<(), FirewallError> {
        if !self.sets.contains_key(first) || !self.sets.contains_key(second) {
            return Err(FirewallError::AlreadyAbsent);
        }
        let a = self.sets.remove(first).unwrap_or_default();
        let b = self.sets.remove(second).unwrap_or_default();
        self.sets.insert(first.to_string(), b);
        self.sets.insert(second.to_string(), a);
        Ok(())
    }

    fn install_chain(
        &mut self,
        chain: &str,
        whitelist_set: &str,
        blacklist_set: &str,
    ) -> Result<(), FirewallError> {
        // Re-install replaces the wiring, mirroring unique hook insertion.
        self.chain = Some((
            chain.to_string(),
            ChainWiring {
                whitelist_set: whitelist_set.to_string(),
                blacklist_set: blacklist_set.to_string(),
            },
        ));
        Ok(())
    }

    fn remove_chain(&mut self, chain: &str) -> Result<(), FirewallError> {
        match &self.chain {
            Some((name, _)) if name == chain => {
                self.chain = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn net(s: &str) -> IpNetwork {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        IpAddr::V4(s.parse::<Ipv4Addr>().unwrap())
    }

    #[test]
    fn whitelist_wins_over_blacklist() {
        let mut backend = MemoryBackend::new();
        backend.create_set("white").unwrap();
        backend.create_set("black").unwrap();
        backend.install_chain("chain", "white", "black").unwrap();
        backend.add_entry("white", net("10.0.0.0/8")).unwrap();
        backend.add_entry("black", net("10.1.2.3/32")).unwrap();

        assert_eq!(backend.evaluate(ip("10.1.2.3"), false), Verdict::Exempt);
    }

    #[test]
    fn established_traffic_bypasses_blacklist() {
        let mut backend = MemoryBackend::new();
        backend.create_set("white").unwrap();
        backend.create_set("black").unwrap();
        backend.install_chain("chain", "white", "black").unwrap();
        backend.add_entry("black", net("203.0.113.5/32")).unwrap();

        assert_eq!(backend.evaluate(ip("203.0.113.5"), true), Verdict::Allowed);
        assert_eq!(backend.evaluate(ip("203.0.113.5"), false), Verdict::Dropped);
    }

    #[test]
    fn no_chain_means_fallthrough() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.evaluate(ip("203.0.113.5"), false), Verdict::Fallthrough);
    }

    #[test]
    fn swap_exchanges_contents_atomically() {
        let mut backend = MemoryBackend::new();
        backend.create_set("live").unwrap();
        backend.create_set("shadow").unwrap();
        backend.add_entry("live", net("1.1.1.1/32")).unwrap();
        backend.add_entry("shadow", net("2.2.2.2/32")).unwrap();

        backend.swap_sets("live", "shadow").unwrap();
        assert_eq!(backend.members("live"), vec![net("2.2.2.2/32")]);
        assert_eq!(backend.members("shadow"), vec![net("1.1.1.1/32")]);
    }

    #[test]
    fn destroy_missing_set_reports_absent() {
        let mut backend = MemoryBackend::new();
        assert!(backend.destroy_set("nope").unwrap_err().is_already_absent());
    }
}
