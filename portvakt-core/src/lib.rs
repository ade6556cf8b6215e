//! # portvakt-core
//!
//! Foundation layer for the portvakt daemon: the scan-event data model and
//! the bounded event bus that carries events from the capture thread to the
//! single ban-decision consumer.

pub mod events;

pub use events::bus::{EventBus, EventError};
pub use events::scan::{ScanEvent, ScanEventKind};
