//! Engine error type.

use thiserror::Error;

use portvakt_capture::CaptureError;
use portvakt_config::ConfigError;
use portvakt_core::EventError;
use portvakt_firewall::FirewallError;
use portvakt_store::StoreError;

use crate::controller::ControllerState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("controller cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ControllerState,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("firewall error: {0}")]
    Firewall(#[from] FirewallError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("event bus error: {0}")]
    Event(#[from] EventError),

    #[error("task error: {0}")]
    Task(String),
}
