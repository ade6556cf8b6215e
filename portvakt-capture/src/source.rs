//! Scan event source: decode, filter, enqueue.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use portvakt_core::{EventBus, ScanEvent, ScanEventKind};

use crate::decode::decode_tcp_syn;
use crate::error::CaptureError;
use crate::live::run_capture_loop;

/// Produces the filtered stream of suspicious connection attempts.
pub struct ScanEventSource {
    monitored_ports: HashSet<u16>,
    egress_ips: HashSet<Ipv4Addr>,
}

impl ScanEventSource {
    pub fn new(
        monitored_ports: impl IntoIterator<Item = u16>,
        egress_ips: impl IntoIterator<Item = Ipv4Addr>,
    ) -> Self {
        Self {
            monitored_ports: monitored_ports.into_iter().collect(),
            egress_ips: egress_ips.into_iter().collect(),
        }
    }

    /// Classify one raw frame, applying the source-side filters.
    pub fn classify(&self, frame: &[u8], timestamp_ms: u64) -> Option<ScanEvent> {
        let syn = decode_tcp_syn(frame)?;
        if !self.monitored_ports.contains(&syn.dst_port) {
            return None;
        }
        if self.egress_ips.contains(&syn.src_ip) {
            return None;
        }
        Some(ScanEvent {
            kind: ScanEventKind::PortScan,
            timestamp_ms,
            src_ip: syn.src_ip,
            src_port: syn.src_port,
            dst_ip: syn.dst_ip,
            dst_port: syn.dst_port,
        })
    }

    /// Capture until `terminate` is set, pushing classified events into the
    /// bus. Closes the bus on exit so the consumer sees a terminal stream.
    pub fn run(
        &self,
        interface: &str,
        snaplen: usize,
        promiscuous: bool,
        terminate: &AtomicBool,
        bus: EventBus,
    ) -> Result<(), CaptureError> {
        let result = run_capture_loop(interface, snaplen, promiscuous, terminate, |frame| {
            let timestamp_ms = now_ms();
            if let Some(event) = self.classify(frame, timestamp_ms) {
                debug!(
                    src = %format_args!("{}:{}", event.src_ip, event.src_port),
                    dst = %format_args!("{}:{}", event.dst_ip, event.dst_port),
                    "recv port scan request"
                );
                if let Err(e) = bus.send(event) {
                    warn!("failed to queue scan event: {e}");
                }
            }
        });
        bus.close();
        result
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
