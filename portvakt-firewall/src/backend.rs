//! Firewall backend capability trait.
//!
//! The synchronizer's logic is written against this trait so the
//! ipset/iptables subprocess implementation is one variant and a direct
//! netlink implementation could be another; nothing upstream assumes
//! either.

use ipnetwork::IpNetwork;
use thiserror::Error;

/// Backend operation errors.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// A required external command is not installed.
    #[error("required command not found: {0}")]
    MissingCommand(String),

    /// A backend command ran and reported failure.
    #[error("{program} {args:?} failed: {detail}")]
    CommandFailed {
        program: String,
        args: Vec<String>,
        detail: String,
    },

    /// A backend command exceeded its deadline and was killed.
    #[error("{program} timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },

    /// The target set, chain, or rule does not exist. Destroy-class callers
    /// absorb this as success.
    #[error("target already absent")]
    AlreadyAbsent,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FirewallError {
    /// True for the "object was not there to begin with" class.
    pub fn is_already_absent(&self) -> bool {
        matches!(self, FirewallError::AlreadyAbsent)
    }
}

/// Primitive operations every firewall backend must supply.
///
/// Contract notes:
/// - `create_set` is create-if-absent.
/// - `destroy_set` fails with [`FirewallError::AlreadyAbsent`] when the set
///   does not exist; the caller decides whether to absorb that.
/// - `swap_sets` atomically exchanges the contents of two existing sets:
///   concurrent traffic evaluation observes either set in full, never a
///   mixture.
/// - `install_chain` wires the evaluation chain with the fixed rule order
///   (whitelist exempt, established/related allow, blacklist drop, fall
///   through) and hooks it uniquely at the primary inbound point and, where
///   present, the container pre-routing point. Repeated installs must not
///   layer duplicate hooks.
/// - `remove_chain` unhooks and deletes the chain, treating every
///   already-absent piece as success; it fails only for unrelated errors.
pub trait FirewallBackend: Send {
    fn create_set(&mut self, set: &str) -> Result<(), FirewallError>;
    fn destroy_set(&mut self, set: &str) -> Result<(), FirewallError>;
    fn add_entry(&mut self, set: &str, entry: IpNetwork) -> Result<(), FirewallError>;
    fn remove_entry(&mut self, set: &str, entry: IpNetwork) -> Result<(), FirewallError>;
    fn load_entries(&mut self, set: &str, entries: &[IpNetwork]) -> Result<(), FirewallError>;
    fn swap_sets(&mut self, first: &str, second: &str) -> Result<(), FirewallError>;
    fn install_chain(
        &mut self,
        chain: &str,
        whitelist_set: &str,
        blacklist_set: &str,
    ) -> Result<(), FirewallError>;
    fn remove_chain(&mut self, chain: &str) -> Result<(), FirewallError>;
}
