//! Ban lifecycle controller.
//!
//! Owns the whole intrusion-response loop: seeds the firewall rule state
//! at startup, runs the capture thread and the single event consumer,
//! applies the ban admission algorithm, sweeps expired bans, and tears
//! the kernel state down again on shutdown.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use portvakt_capture::{ensure_device, CaptureError, ScanEventSource};
use portvakt_config::PortvaktConfig;
use portvakt_core::{EventBus, ScanEvent};
use portvakt_firewall::{FirewallBackend, RuleSync};
use portvakt_store::BanStore;
use portvakt_telemetry::{EventLogger, MetricsRecorder};

use crate::error::EngineError;
use crate::filter::EventFilter;
use crate::seeds;

const EVENT_BUS_CAPACITY: usize = 1024;

/// How long the consumer sleeps when the bus is empty and no timer fired.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Controller lifecycle phase. Transitions are strictly
/// Stopped -> Initializing -> Running -> Stopping -> Stopped; operations
/// issued in any other phase are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Initializing,
    Running,
    Stopping,
}

/// The controller facade. Owns the consumer components while stopped and
/// hands them to the event-loop task while running.
pub struct BanController<B: FirewallBackend + Send + 'static> {
    config: PortvaktConfig,
    state: ControllerState,
    shutdown: Arc<AtomicBool>,
    capture_stop: Arc<AtomicBool>,
    idle: Option<Consumer<B>>,
    consumer_task: Option<JoinHandle<Consumer<B>>>,
    capture_task: Option<JoinHandle<Result<(), CaptureError>>>,
}

impl<B: FirewallBackend + Send + 'static> BanController<B> {
    pub fn new(
        config: PortvaktConfig,
        store: BanStore,
        rules: RuleSync<B>,
        metrics: MetricsRecorder,
    ) -> Self {
        let consumer = Consumer {
            rules,
            store,
            filters: Vec::new(),
            metrics,
            view_mode: config.ban.view_mode,
            retention_ms: config.ban.retention().as_millis() as i64,
            sweep_interval: config.ban.sweep_interval(),
        };
        Self {
            config,
            state: ControllerState::Stopped,
            shutdown: Arc::new(AtomicBool::new(false)),
            capture_stop: Arc::new(AtomicBool::new(false)),
            idle: Some(consumer),
            consumer_task: None,
            capture_task: None,
        }
    }

    /// Register an admission filter. Only callable while stopped.
    pub fn add_filter(&mut self, filter: Box<dyn EventFilter>) -> Result<(), EngineError> {
        match self.idle.as_mut() {
            Some(consumer) => {
                consumer.filters.push(filter);
                Ok(())
            }
            None => Err(EngineError::InvalidState {
                operation: "add_filter",
                state: self.state,
            }),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Bring the system online: seed and install the firewall state, then
    /// start the capture thread and the event consumer.
    ///
    /// Any failure before the tasks are spawned leaves the controller
    /// stopped, with the components back in place for a retry.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.state != ControllerState::Stopped {
            return Err(EngineError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.state = ControllerState::Initializing;
        match self.start_inner() {
            Ok(()) => {
                self.state = ControllerState::Running;
                info!("ban controller running");
                Ok(())
            }
            Err(e) => {
                self.state = ControllerState::Stopped;
                Err(e)
            }
        }
    }

    fn start_inner(&mut self) -> Result<(), EngineError> {
        let mut consumer = self.idle.take().ok_or_else(|| EngineError::Task(
            "controller components missing".to_string(),
        ))?;

        // Everything that can fail runs before any task is spawned.
        let result = (|| {
            let ports = self.config.capture.expand_ports()?;
            ensure_device(&self.config.capture.interface)?;
            let bus = EventBus::with_capacity(EVENT_BUS_CAPACITY)?;

            let now = now_ms();
            let blacklist = seeds::blacklist_seed(&consumer.store, &self.config.ban, now)?;
            let whitelist = seeds::whitelist_seed(&self.config.ban)?;
            consumer.rules.init(&blacklist, &whitelist)?;
            Ok::<_, EngineError>((ports, bus))
        })();

        let (ports, bus) = match result {
            Ok(parts) => parts,
            Err(e) => {
                self.idle = Some(consumer);
                return Err(e);
            }
        };

        self.shutdown.store(false, Ordering::Release);
        self.capture_stop.store(false, Ordering::Release);

        let source = ScanEventSource::new(ports, self.config.capture.egress_ips.iter().copied());
        let interface = self.config.capture.interface.clone();
        let snaplen = self.config.capture.snaplen;
        let promiscuous = self.config.capture.promiscuous;
        let capture_bus = bus.share();
        let capture_stop = Arc::clone(&self.capture_stop);
        self.capture_task = Some(tokio::task::spawn_blocking(move || {
            source.run(&interface, snaplen, promiscuous, &capture_stop, capture_bus)
        }));

        let shutdown = Arc::clone(&self.shutdown);
        self.consumer_task = Some(tokio::spawn(async move { consumer.run(bus, shutdown).await }));
        Ok(())
    }

    /// Block until the event source ends on its own, which only happens on
    /// a terminal capture failure. Returns that failure.
    ///
    /// Cancellation-safe: the join handle stays in place until the task
    /// has actually finished, so `stop` still joins the capture thread
    /// when a shutdown signal interrupts this wait.
    pub async fn wait_for_capture(&mut self) -> Result<(), EngineError> {
        let Some(handle) = self.capture_task.as_mut() else {
            return Ok(());
        };
        let result = handle.await;
        self.capture_task = None;
        match result {
            Ok(result) => result.map_err(EngineError::from),
            Err(e) => Err(EngineError::Task(e.to_string())),
        }
    }

    /// Two-phase shutdown: quiesce the capture thread and the consumer
    /// first, then tear down the kernel firewall state.
    ///
    /// Teardown failures are logged, not returned; the controller always
    /// reaches the stopped state.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        if self.state != ControllerState::Running {
            return Err(EngineError::InvalidState {
                operation: "stop",
                state: self.state,
            });
        }
        self.state = ControllerState::Stopping;
        info!("ban controller stopping");

        // Phase one: stop the producers and drain the consumer.
        self.capture_stop.store(true, Ordering::Release);
        self.shutdown.store(true, Ordering::Release);

        if let Some(handle) = self.capture_task.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "capture thread ended with error"),
                Err(e) => warn!(error = %e, "capture thread join failed"),
            }
        }

        let mut consumer = match self.consumer_task.take() {
            Some(handle) => handle
                .await
                .map_err(|e| EngineError::Task(e.to_string()))?,
            None => {
                return Err(EngineError::Task(
                    "consumer task missing during shutdown".to_string(),
                ))
            }
        };

        // Phase two: the consumer is quiescent, remove the kernel state.
        match consumer.rules.destroy() {
            Ok(()) => {
                EventLogger::log_event("firewall_teardown", Vec::new()).await;
            }
            Err(e) => error!(error = %e, "firewall teardown failed, stale rules may remain"),
        }

        self.idle = Some(consumer);
        self.state = ControllerState::Stopped;
        info!("ban controller stopped");
        Ok(())
    }
}

/// The single logical consumer: event handling, the expiry timer and the
/// shutdown signal are multiplexed in one loop, so store and firewall
/// mutations are never concurrent.
struct Consumer<B: FirewallBackend> {
    rules: RuleSync<B>,
    store: BanStore,
    filters: Vec<Box<dyn EventFilter>>,
    metrics: MetricsRecorder,
    view_mode: bool,
    retention_ms: i64,
    sweep_interval: Duration,
}

impl<B: FirewallBackend> Consumer<B> {
    async fn run(mut self, bus: EventBus, shutdown: Arc<AtomicBool>) -> Self {
        info!(
            view_mode = self.view_mode,
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "event loop started"
        );
        let mut last_sweep = Instant::now();

        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            // Timer before events, so a sustained event flood cannot
            // starve the expiry sweep.
            if last_sweep.elapsed() >= self.sweep_interval {
                self.run_expiry_sweep();
                last_sweep = Instant::now();
            }
            if let Some(event) = bus.recv() {
                if let Err(e) = self.handle_event(&event).await {
                    error!(error = %e, src = %event.src_ip, "scan event handling failed");
                }
                continue;
            }
            tokio::time::sleep(IDLE_BACKOFF).await;
        }
        info!("event loop exited");
        self
    }

    /// Admission algorithm for one scan event.
    ///
    /// A source already carrying a ban record only gets its record
    /// refreshed; the firewall entry from the first ban is still in place,
    /// so at most one firewall ban is issued per record lifetime.
    async fn handle_event(&mut self, event: &ScanEvent) -> Result<(), EngineError> {
        self.metrics.scan_events.inc();

        for filter in &self.filters {
            if !filter.admit(event) {
                debug!(filter = filter.name(), src = %event.src_ip, "event suppressed");
                return Ok(());
            }
        }

        let ip = event.src_ip;
        if self.view_mode {
            info!(src = %ip, dst_port = event.dst_port, "view mode, ban suppressed");
            EventLogger::log_event(
                "ban_intent",
                vec![KeyValue::new("ip_address", ip.to_string())],
            )
            .await;
            return Ok(());
        }

        let now = now_ms();
        let key = ip.to_string();
        if let Some(record) = self.store.get(&key)? {
            self.store.touch(&key, now)?;
            debug!(src = %ip, visits = record.visit_count + 1, "repeat offender, record refreshed");
            return Ok(());
        }

        // Firewall first: if this fails no record exists, and the next
        // event from the same source retries the ban.
        self.rules.ban_ip(ip)?;
        self.metrics.bans.inc();
        if let Err(e) = self.store.insert_if_absent(&key, &event.remark(), now) {
            // The firewall entry exists but no record does; restarts seed
            // from the store, so this must be loud.
            warn!(src = %ip, error = %e, "ban applied but record insert failed");
            return Err(e.into());
        }
        info!(src = %ip, remark = %event.remark(), "ip banned");
        EventLogger::log_event(
            "firewall_ban",
            vec![
                KeyValue::new("ip_address", key),
                KeyValue::new("remark", event.remark()),
            ],
        )
        .await;
        Ok(())
    }

    /// Unban every record older than the retention window. Per-record
    /// failures are logged and skipped; a record whose unban fails stays
    /// in the store and is retried on the next sweep.
    fn run_expiry_sweep(&mut self) {
        let started = Instant::now();
        let cutoff = now_ms() - self.retention_ms;

        let store = &self.store;
        let rules = &mut self.rules;
        let metrics = &self.metrics;
        let mut removed = 0u64;

        let scan = store.for_each_stale(cutoff, |record| {
            let ip = match record.ip.parse::<Ipv4Addr>() {
                Ok(ip) => ip,
                Err(_) => {
                    warn!(ip = %record.ip, "unparseable IP in expired record, skipping");
                    return;
                }
            };
            if let Err(e) = rules.unban_ip(ip) {
                warn!(ip = %record.ip, error = %e, "unban failed, record kept for next sweep");
                return;
            }
            match store.delete(&record.ip) {
                Ok(_) => {
                    removed += 1;
                    metrics.unbans.inc();
                }
                Err(e) => warn!(ip = %record.ip, error = %e, "expired record delete failed"),
            }
        });
        if let Err(e) = scan {
            error!(error = %e, "expiry sweep scan failed");
        }

        self.metrics
            .sweep_duration
            .observe(started.elapsed().as_millis() as f64);
        if removed > 0 {
            info!(removed, "expiry sweep unbanned stale records");
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use portvakt_core::ScanEventKind;
    use portvakt_firewall::{MemoryBackend, SetNames, Verdict};
    use std::net::IpAddr;

    const DAY_MS: i64 = 24 * 3600 * 1000;

    fn consumer(view_mode: bool) -> Consumer<MemoryBackend> {
        let names = SetNames {
            blacklist: "pv-black".into(),
            whitelist: "pv-white".into(),
            chain: "PORTVAKT".into(),
        };
        let mut rules = RuleSync::new(MemoryBackend::new(), names);
        rules.init(&[], &[]).unwrap();
        Consumer {
            rules,
            store: BanStore::in_memory().unwrap(),
            filters: Vec::new(),
            metrics: MetricsRecorder::new(),
            view_mode,
            retention_ms: 90 * DAY_MS,
            sweep_interval: Duration::from_secs(60),
        }
    }

    fn event(src: &str) -> ScanEvent {
        ScanEvent {
            kind: ScanEventKind::PortScan,
            timestamp_ms: 1,
            src_ip: src.parse().unwrap(),
            src_port: 40000,
            dst_ip: "192.0.2.1".parse().unwrap(),
            dst_port: 22,
        }
    }

    #[tokio::test]
    async fn repeat_offender_gets_one_firewall_ban() {
        let mut consumer = consumer(false);
        consumer.handle_event(&event("9.9.9.9")).await.unwrap();
        consumer.handle_event(&event("9.9.9.9")).await.unwrap();

        assert_eq!(consumer.rules.backend().add_entry_calls(), 1);
        let record = consumer.store.get("9.9.9.9").unwrap().unwrap();
        assert_eq!(record.visit_count, 2);
        assert_eq!(record.remark, "port_scan:22");

        let verdict = consumer
            .rules
            .backend()
            .evaluate("9.9.9.9".parse::<IpAddr>().unwrap(), false);
        assert_eq!(verdict, Verdict::Dropped);
    }

    #[tokio::test]
    async fn view_mode_mutates_nothing() {
        let mut consumer = consumer(true);
        consumer.handle_event(&event("9.9.9.9")).await.unwrap();

        assert_eq!(consumer.rules.backend().add_entry_calls(), 0);
        assert!(consumer.store.get("9.9.9.9").unwrap().is_none());
    }

    #[tokio::test]
    async fn filter_suppresses_before_admission() {
        let mut consumer = consumer(false);
        consumer.filters.push(Box::new(crate::filter::NetworkFilter::new(
            vec!["9.0.0.0/8".parse().unwrap()],
        )));

        consumer.handle_event(&event("9.9.9.9")).await.unwrap();
        assert!(consumer.store.get("9.9.9.9").unwrap().is_none());

        consumer.handle_event(&event("203.0.113.7")).await.unwrap();
        assert!(consumer.store.get("203.0.113.7").unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_ban_leaves_no_record_and_retries() {
        let mut consumer = consumer(false);
        consumer.rules.backend_mut().fail_next_add();

        assert!(consumer.handle_event(&event("9.9.9.9")).await.is_err());
        assert!(consumer.store.get("9.9.9.9").unwrap().is_none());

        // The next event from the same source is a fresh ban attempt.
        consumer.handle_event(&event("9.9.9.9")).await.unwrap();
        assert!(consumer.store.get("9.9.9.9").unwrap().is_some());
        assert_eq!(consumer.rules.backend().members("pv-black").len(), 1);
    }

    #[tokio::test]
    async fn sweep_unbans_only_expired_records() {
        let mut consumer = consumer(false);
        let now = now_ms();

        // One record aged past the 90 day retention window, one fresh.
        consumer
            .store
            .insert_if_absent("1.1.1.1", "port_scan:22", now - 100 * DAY_MS)
            .unwrap();
        consumer.rules.ban_ip("1.1.1.1".parse().unwrap()).unwrap();
        consumer.handle_event(&event("2.2.2.2")).await.unwrap();

        consumer.run_expiry_sweep();

        assert!(consumer.store.get("1.1.1.1").unwrap().is_none());
        assert!(consumer.store.get("2.2.2.2").unwrap().is_some());
        let members = consumer.rules.backend().members("pv-black");
        assert_eq!(members, vec!["2.2.2.2/32".parse().unwrap()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn event_loop_drains_bus_and_returns_on_shutdown() {
        let consumer = consumer(false);
        let bus = EventBus::with_capacity(16).unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));

        bus.send(event("9.9.9.9")).unwrap();
        bus.send(event("9.9.9.9")).unwrap();

        let task = tokio::spawn(consumer.run(bus.share(), Arc::clone(&shutdown)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.store(true, Ordering::Release);

        let consumer = task.await.unwrap();
        let record = consumer.store.get("9.9.9.9").unwrap().unwrap();
        assert_eq!(record.visit_count, 2);
        assert_eq!(consumer.rules.backend().add_entry_calls(), 1);
    }

    fn controller() -> BanController<MemoryBackend> {
        let config = PortvaktConfig::default();
        let names = SetNames {
            blacklist: config.firewall.blacklist_set.clone(),
            whitelist: config.firewall.whitelist_set.clone(),
            chain: config.firewall.chain.clone(),
        };
        let rules = RuleSync::new(MemoryBackend::new(), names);
        let store = BanStore::in_memory().unwrap();
        BanController::new(config, store, rules, MetricsRecorder::new())
    }

    /// Put a controller into the running state without a capture device:
    /// the consumer runs on an empty bus and a stand-in blocking task
    /// plays the capture thread, honoring the stop flag.
    fn spawn_running(controller: &mut BanController<MemoryBackend>) {
        let consumer = controller.idle.take().unwrap();
        let bus = EventBus::with_capacity(16).unwrap();
        let shutdown = Arc::clone(&controller.shutdown);
        controller.consumer_task =
            Some(tokio::spawn(async move { consumer.run(bus, shutdown).await }));

        let stop = Arc::clone(&controller.capture_stop);
        controller.capture_task = Some(tokio::task::spawn_blocking(move || {
            while !stop.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        }));
        controller.state = ControllerState::Running;
    }

    #[tokio::test]
    async fn stop_requires_running_state() {
        let mut controller = controller();

        assert_eq!(controller.state(), ControllerState::Stopped);
        let err = controller.stop().await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { operation: "stop", .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interrupted_capture_wait_still_joins_on_stop() {
        let mut controller = controller();
        spawn_running(&mut controller);

        // A shutdown signal winning the race drops the wait future; the
        // join handle must survive that for stop's phase-one join.
        tokio::select! {
            _ = controller.wait_for_capture() => panic!("capture ended unexpectedly"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }
        assert!(controller.capture_task.is_some());

        controller.stop().await.unwrap();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert!(controller.capture_task.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_runs_while_events_keep_arriving() {
        let mut consumer = consumer(false);
        consumer.sweep_interval = Duration::from_millis(20);
        let now = now_ms();
        consumer
            .store
            .insert_if_absent("1.1.1.1", "port_scan:22", now - 100 * DAY_MS)
            .unwrap();
        consumer.rules.ban_ip("1.1.1.1".parse().unwrap()).unwrap();

        let bus = EventBus::with_capacity(1024).unwrap();
        let shutdown = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(consumer.run(bus.share(), Arc::clone(&shutdown)));

        // Keep the bus stocked across several sweep intervals.
        let mut n = 0u32;
        for _ in 0..30 {
            for _ in 0..8 {
                n += 1;
                let ip = format!("10.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff);
                let _ = bus.send(event(&ip));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.store(true, Ordering::Release);

        let consumer = task.await.unwrap();
        assert!(consumer.store.get("1.1.1.1").unwrap().is_none());
        assert!(!consumer.rules.backend().members("pv-black").contains(&"1.1.1.1/32".parse().unwrap()));
    }
}
