//! Prometheus metrics for the ban lifecycle.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: prometheus::Registry,
    pub scan_events: prometheus::Counter,
    pub bans: prometheus::Counter,
    pub unbans: prometheus::Counter,
    pub sweep_duration: prometheus::Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let scan_events =
            Counter::new("portvakt_scan_events_total", "Total scan events consumed").unwrap();
        let bans = Counter::new("portvakt_bans_total", "Total IPs banned").unwrap();
        let unbans = Counter::new("portvakt_unbans_total", "Total IPs unbanned by expiry").unwrap();

        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new("portvakt_sweep_duration_ms", "Expiry sweep wall time")
                .buckets(vec![1.0, 10.0, 100.0, 1_000.0, 10_000.0]),
        )
        .unwrap();

        registry.register(Box::new(scan_events.clone())).unwrap();
        registry.register(Box::new(bans.clone())).unwrap();
        registry.register(Box::new(unbans.clone())).unwrap();
        registry.register(Box::new(sweep_duration.clone())).unwrap();

        Self {
            registry,
            scan_events,
            bans,
            unbans,
            sweep_duration,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_and_gather() {
        let metrics = MetricsRecorder::new();
        metrics.scan_events.inc();
        metrics.bans.inc();
        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("portvakt_scan_events_total"));
        assert!(text.contains("portvakt_bans_total"));
    }
}
