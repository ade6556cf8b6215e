//! Rule synchronizer: keeps the kernel's decision state equal to the
//! logical rule set, atomically and idempotently.

use std::net::{IpAddr, Ipv4Addr};

use ipnetwork::IpNetwork;
use tracing::{info, warn};

use crate::backend::{FirewallBackend, FirewallError};

/// Names of the kernel objects this synchronizer owns.
#[derive(Debug, Clone)]
pub struct SetNames {
    pub blacklist: String,
    pub whitelist: String,
    pub chain: String,
}

impl SetNames {
    fn shadow(live: &str) -> String {
        format!("{live}-shadow")
    }
}

/// Owner of the two address sets and the evaluation chain.
///
/// The controller is the sole caller for the process lifetime; bulk
/// init/destroy and per-IP mutation are never issued concurrently, so no
/// internal locking is needed.
pub struct RuleSync<B: FirewallBackend> {
    backend: B,
    names: SetNames,
}

impl<B: FirewallBackend> RuleSync<B> {
    pub fn new(backend: B, names: SetNames) -> Self {
        Self { backend, names }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Establish both address sets and the evaluation chain from a clean
    /// baseline. Tears down any previous instance first, so repeated calls
    /// never layer duplicate rules.
    ///
    /// A failure mid-install tears the partial state back down before
    /// returning, so the kernel is left fully torn down, never half wired.
    pub fn init(
        &mut self,
        blacklist: &[IpNetwork],
        whitelist: &[IpNetwork],
    ) -> Result<(), FirewallError> {
        self.destroy()?;

        if let Err(e) = self.install(blacklist, whitelist) {
            if let Err(cleanup) = self.destroy() {
                warn!(error = %cleanup, "cleanup after failed init also failed");
            }
            return Err(e);
        }
        info!(
            blacklist = blacklist.len(),
            whitelist = whitelist.len(),
            "firewall rule state established"
        );
        Ok(())
    }

    fn install(
        &mut self,
        blacklist: &[IpNetwork],
        whitelist: &[IpNetwork],
    ) -> Result<(), FirewallError> {
        self.backend.create_set(&self.names.blacklist)?;
        self.backend.create_set(&self.names.whitelist)?;

        let black = self.names.blacklist.clone();
        self.bulk_replace(&black, blacklist)?;
        let white = self.names.whitelist.clone();
        self.bulk_replace(&white, whitelist)?;

        self.backend
            .install_chain(&self.names.chain, &self.names.whitelist, &self.names.blacklist)
    }

    /// Replace the whole contents of `live` through a fully-populated
    /// shadow set and one atomic swap. Concurrent evaluation sees either
    /// the complete old set or the complete new one, never a partial load.
    fn bulk_replace(&mut self, live: &str, entries: &[IpNetwork]) -> Result<(), FirewallError> {
        let shadow = SetNames::shadow(live);
        // A crashed run may have left a stale shadow behind.
        absorb_absent(self.backend.destroy_set(&shadow))?;
        self.backend.create_set(&shadow)?;
        self.backend.load_entries(&shadow, entries)?;
        self.backend.swap_sets(live, &shadow)?;
        // The old contents now sit under the shadow name.
        self.backend.destroy_set(&shadow)?;
        Ok(())
    }

    /// Remove the chain hooks and discard both address sets.
    ///
    /// "Target does not exist" counts as success; not every destroy follows
    /// a successful init.
    pub fn destroy(&mut self) -> Result<(), FirewallError> {
        self.backend.remove_chain(&self.names.chain)?;
        let black_shadow = SetNames::shadow(&self.names.blacklist);
        let white_shadow = SetNames::shadow(&self.names.whitelist);
        absorb_absent(self.backend.destroy_set(&black_shadow))?;
        absorb_absent(self.backend.destroy_set(&white_shadow))?;
        absorb_absent(self.backend.destroy_set(&self.names.blacklist))?;
        absorb_absent(self.backend.destroy_set(&self.names.whitelist))?;
        Ok(())
    }

    /// Add one source to the live blacklist; effective immediately.
    pub fn ban_ip(&mut self, ip: Ipv4Addr) -> Result<(), FirewallError> {
        let black = self.names.blacklist.clone();
        self.backend.add_entry(&black, host_net(ip))
    }

    /// Remove one source from the live blacklist. Removing an entry that is
    /// not present is treated as success.
    pub fn unban_ip(&mut self, ip: Ipv4Addr) -> Result<(), FirewallError> {
        let black = self.names.blacklist.clone();
        match self.backend.remove_entry(&black, host_net(ip)) {
            Err(e) if e.is_already_absent() => {
                warn!(%ip, "unban for entry not in blacklist set");
                Ok(())
            }
            other => other,
        }
    }

    /// Add one source to the live whitelist.
    pub fn white_ip(&mut self, ip: Ipv4Addr) -> Result<(), FirewallError> {
        let white = self.names.whitelist.clone();
        self.backend.add_entry(&white, host_net(ip))
    }

    /// Remove one source from the live whitelist.
    pub fn unwhite_ip(&mut self, ip: Ipv4Addr) -> Result<(), FirewallError> {
        let white = self.names.whitelist.clone();
        match self.backend.remove_entry(&white, host_net(ip)) {
            Err(e) if e.is_already_absent() => Ok(()),
            other => other,
        }
    }
}

fn host_net(ip: Ipv4Addr) -> IpNetwork {
    IpNetwork::from(IpAddr::V4(ip))
}

fn absorb_absent(result: Result<(), FirewallError>) -> Result<(), FirewallError> {
    match result {
        Err(e) if e.is_already_absent() => Ok(()),
        other => other,
    }
}
