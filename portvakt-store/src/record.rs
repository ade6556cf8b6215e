//! Ban record row model.

/// One banned source address.
///
/// `ip` is unique across the table. A record is created on the first
/// offending event for an IP, its `last_seen_at_ms`/`visit_count` are
/// refreshed on repeats, and it is removed only by the expiry sweep or an
/// explicit unban.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub id: i64,
    /// Exact IP, not a CIDR.
    pub ip: String,
    /// Description of the triggering event, e.g. `port_scan:22`.
    pub remark: String,
    /// Milliseconds since the UNIX epoch.
    pub created_at_ms: i64,
    /// Milliseconds since the UNIX epoch; refreshed on every repeat event.
    pub last_seen_at_ms: i64,
    /// Number of offending events observed, >= 1.
    pub visit_count: i64,
}
