//! Capture error types.

use thiserror::Error;

/// Errors from the live capture subsystem. All of these are terminal for
/// the event stream: opening failures abort startup, loop failures signal
/// stream death to the controller.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device '{0}' not found")]
    DeviceNotFound(String),

    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),
}
