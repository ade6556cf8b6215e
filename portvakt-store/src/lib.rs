//! # portvakt-store
//!
//! Durable ban-record table backed by SQLite. The store owns the records;
//! the controller only reads and writes through this contract and never
//! caches a record beyond a single decision.

mod record;
mod store;

pub use record::BanRecord;
pub use store::{BanStore, StoreError};
