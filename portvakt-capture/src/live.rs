//! Live pcap capture loop.

use std::sync::atomic::{AtomicBool, Ordering};

use pcap::{Capture, Device};
use tracing::{info, warn};

use crate::error::CaptureError;

/// Verify that `interface` exists before committing to a capture thread,
/// so a misconfigured interface fails startup instead of surfacing later
/// from inside the capture loop.
pub fn ensure_device(interface: &str) -> Result<(), CaptureError> {
    Device::list()?
        .into_iter()
        .find(|d| d.name == interface)
        .map(|_| ())
        .ok_or_else(|| CaptureError::DeviceNotFound(interface.to_string()))
}

/// Run a live capture loop on the specified interface, invoking `callback`
/// with each raw frame. Blocks until `terminate` is set or the capture
/// fails terminally.
pub fn run_capture_loop<F>(
    interface: &str,
    snaplen: usize,
    promiscuous: bool,
    terminate: &AtomicBool,
    mut callback: F,
) -> Result<(), CaptureError>
where
    F: FnMut(&[u8]),
{
    let device = Device::list()?
        .into_iter()
        .find(|d| d.name == interface)
        .ok_or_else(|| CaptureError::DeviceNotFound(interface.to_string()))?;

    let mut cap = Capture::from_device(device)?
        .promisc(promiscuous)
        .snaplen(snaplen as i32)
        .timeout(1000) // ms; bounds the terminate-flag latency
        .open()?;

    info!(interface, promiscuous, "capture opened");

    while !terminate.load(Ordering::Relaxed) {
        match cap.next_packet() {
            Ok(packet) => callback(packet.data),
            Err(pcap::Error::TimeoutExpired) => {
                // No packet in this window; re-check the terminate flag.
                continue;
            }
            Err(e) => {
                warn!(error = %e, "capture loop terminated");
                return Err(CaptureError::Pcap(e));
            }
        }
    }
    Ok(())
}
