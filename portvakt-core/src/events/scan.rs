//! Scan event types.

use std::fmt;
use std::net::Ipv4Addr;

/// Classification tag for a suspicious connection attempt.
///
/// Consumers match on this exhaustively; adding a variant is a breaking
/// change by design so every decision path handles every kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanEventKind {
    /// First packet of a TCP connection attempt against a monitored port.
    PortScan,
}

impl ScanEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanEventKind::PortScan => "port_scan",
        }
    }
}

impl fmt::Display for ScanEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single suspicious connection attempt observed on the wire.
///
/// Transient: produced by the capture source, consumed exactly once by the
/// ban controller, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEvent {
    pub kind: ScanEventKind,
    /// Wall-clock observation time, milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl ScanEvent {
    /// Human-readable description of the triggering event, stored as the
    /// ban-record remark.
    pub fn remark(&self) -> String {
        format!("{}:{}", self.kind, self.dst_port)
    }
}
