//! Thread-safe event bus between the capture thread and the ban controller.
//!
//! A lock-free single-producer single-consumer (SPSC) ring buffer using
//! atomic head/tail counters. The capture callback is the only producer and
//! the controller's event loop the only consumer, which keeps the decision
//! path free of locks.
//!
//! - Cache-line aligned counters prevent false sharing
//! - Backpressure is signalled explicitly with `EventError::QueueFull`
//! - `close()` marks the stream terminal so the consumer can distinguish
//!   "momentarily empty" from "capture is gone"

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::scan::ScanEvent;

/// Event bus error conditions.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event queue capacity exceeded")]
    QueueFull,
    #[error("Event bus is closed")]
    Closed,
    #[error("Invalid capacity (must be a power of two)")]
    InvalidCapacity,
}

/// Cache-line aligned atomic counter to prevent false sharing
#[repr(align(64))]
struct AlignedCounter(AtomicU64);

impl AlignedCounter {
    #[inline]
    fn new(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }
}

struct InnerBus {
    buffer: Box<[UnsafeCell<Option<ScanEvent>>]>,
    head: AlignedCounter,
    tail: AlignedCounter,
    mask: usize,
    closed: AtomicBool,
}

/// Bounded SPSC bus carrying [`ScanEvent`]s.
pub struct EventBus {
    inner: Arc<InnerBus>,
}

impl EventBus {
    /// Creates a new event bus with the specified capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Must be a power of two for efficient index masking.
    pub fn with_capacity(capacity: usize) -> Result<Self, EventError> {
        if !capacity.is_power_of_two() {
            return Err(EventError::InvalidCapacity);
        }

        let buffer = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            inner: Arc::new(InnerBus {
                buffer,
                head: AlignedCounter::new(0),
                tail: AlignedCounter::new(0),
                mask: capacity - 1,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Creates a new handle to the shared bus.
    #[inline]
    pub fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Attempts to enqueue an event.
    ///
    /// Fails with `Closed` once the producer side has signalled terminal
    /// failure, and with `QueueFull` when the consumer is behind.
    #[inline]
    pub fn send(&self, event: ScanEvent) -> Result<(), EventError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EventError::Closed);
        }

        let head = self.inner.head.0.load(Ordering::Relaxed);
        let tail = self.inner.tail.0.load(Ordering::Acquire);

        if head - tail >= self.inner.buffer.len() as u64 {
            return Err(EventError::QueueFull);
        }

        // SAFETY: Exclusive write access ensured by atomic counters
        unsafe {
            let idx = (head as usize) & self.inner.mask;
            *self.inner.buffer[idx].get() = Some(event);
        }

        self.inner.head.0.store(head + 1, Ordering::Release);
        Ok(())
    }

    /// Attempts to dequeue an event; `None` when the queue is empty.
    #[inline]
    pub fn recv(&self) -> Option<ScanEvent> {
        let tail = self.inner.tail.0.load(Ordering::Relaxed);
        let head = self.inner.head.0.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // SAFETY: Exclusive read access ensured by atomic counters
        let event = unsafe {
            let idx = (tail as usize) & self.inner.mask;
            (*self.inner.buffer[idx].get()).take()
        };

        self.inner.tail.0.store(tail + 1, Ordering::Release);
        event
    }

    /// Marks the stream terminal. Buffered events remain receivable.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    /// True once `close()` has been called on any handle.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

// SAFETY: Thread safety ensured by atomic counters and Arc
unsafe impl Send for InnerBus {}
unsafe impl Sync for InnerBus {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::scan::ScanEventKind;
    use std::net::Ipv4Addr;

    fn test_event(seq: u64) -> ScanEvent {
        ScanEvent {
            kind: ScanEventKind::PortScan,
            timestamp_ms: seq,
            src_ip: Ipv4Addr::new(198, 51, 100, 7),
            src_port: 40000,
            dst_ip: Ipv4Addr::new(192, 0, 2, 1),
            dst_port: 22,
        }
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(
            EventBus::with_capacity(3),
            Err(EventError::InvalidCapacity)
        ));
    }

    #[test]
    fn handles_single_element() {
        let bus = EventBus::with_capacity(2).unwrap();
        bus.send(test_event(1)).unwrap();
        assert_eq!(bus.recv().unwrap().timestamp_ms, 1);
    }

    #[test]
    fn signals_queue_full() {
        let bus = EventBus::with_capacity(2).unwrap();
        bus.send(test_event(1)).unwrap();
        bus.send(test_event(2)).unwrap();
        assert!(matches!(bus.send(test_event(3)), Err(EventError::QueueFull)));
    }

    #[test]
    fn maintains_ordering() {
        let bus = EventBus::with_capacity(4).unwrap();
        bus.send(test_event(1)).unwrap();
        bus.send(test_event(2)).unwrap();
        assert_eq!(bus.recv().unwrap().timestamp_ms, 1);
        assert_eq!(bus.recv().unwrap().timestamp_ms, 2);
    }

    #[test]
    fn wraps_buffer_correctly() {
        let bus = EventBus::with_capacity(4).unwrap();
        for cycle in 0..2 {
            for i in 0..4 {
                bus.send(test_event(i + cycle * 4)).unwrap();
            }
            for i in 0..4 {
                assert_eq!(bus.recv().unwrap().timestamp_ms, i + cycle * 4);
            }
        }
    }

    #[test]
    fn close_rejects_sends_but_drains() {
        let bus = EventBus::with_capacity(4).unwrap();
        bus.send(test_event(1)).unwrap();
        bus.close();
        assert!(matches!(bus.send(test_event(2)), Err(EventError::Closed)));
        assert_eq!(bus.recv().unwrap().timestamp_ms, 1);
        assert!(bus.recv().is_none());
        assert!(bus.is_closed());
    }
}
