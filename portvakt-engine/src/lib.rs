//! # portvakt-engine
//!
//! The ban lifecycle controller: builds the initial rule state from the
//! store and user lists, consumes scan events, applies ban decisions
//! against the store and the firewall synchronizer, runs the periodic
//! expiry sweep, and guarantees clean teardown on shutdown.

mod controller;
mod error;
mod filter;
mod seeds;

pub use controller::{BanController, ControllerState};
pub use error::EngineError;
pub use filter::{EventFilter, NetworkFilter};
pub use seeds::{blacklist_seed, reserved_networks, whitelist_seed};
