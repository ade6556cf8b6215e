//! # portvakt-firewall
//!
//! Owns the kernel-level block/allow state: two address sets (blacklist and
//! whitelist) plus the evaluation chain that applies them to inbound
//! traffic. [`RuleSync`] provides idempotent lifecycle operations and
//! constant-time membership mutation over any [`FirewallBackend`].
//!
//! Backends:
//! - [`IptablesBackend`]: shells out to `ipset`/`iptables`
//! - [`MemoryBackend`]: in-process model with chain evaluation, for tests

pub mod backend;
pub mod iptables;
pub mod memory;
pub mod sync;

pub use backend::{FirewallBackend, FirewallError};
pub use iptables::IptablesBackend;
pub use memory::{MemoryBackend, Verdict};
pub use sync::{RuleSync, SetNames};
