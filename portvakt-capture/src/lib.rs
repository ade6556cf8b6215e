//! # portvakt-capture
//!
//! Live traffic event source. Captures packets with pcap on a dedicated
//! thread, classifies first-packet connection attempts against the
//! monitored decoy ports, and feeds [`portvakt_core::ScanEvent`]s to the
//! single consumer through the bounded event bus.
//!
//! Filtering happens at the source:
//! - only TCP SYN (and not ACK) packets count as connection attempts
//! - only monitored destination ports are reported
//! - traffic sourced from the host's own egress addresses is never
//!   reported, so outbound probes cannot self-ban the host

pub mod decode;
pub mod error;
pub mod live;
pub mod source;

pub use error::CaptureError;
pub use live::ensure_device;
pub use source::ScanEventSource;
