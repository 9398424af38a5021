//! Engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the engine at startup or while queuing actions.
///
/// Per-message failures (decode errors, unknown-entity mutations) are
/// deliberately *not* represented here: they are contained where they occur
/// and only logged. Everything in this enum is either fatal to startup or a
/// sign that the process is already shutting down.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The entity definition directory could not be read.
    #[error("failed to read entity directory {path}: {source}")]
    EntityDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An individual entity definition file was malformed.
    #[error("invalid entity definition {path}: {source}")]
    EntityDefinition {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The action ingress queue is gone, which only happens once the
    /// dispatcher has stopped.
    #[error("action ingress is closed")]
    IngressClosed,

    /// The router dispatcher was started more than once.
    #[error("dispatcher already running")]
    DispatcherRunning,
}
