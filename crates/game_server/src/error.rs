//! Server error types.

use playgrid_engine::SessionId;
use thiserror::Error;

/// Errors surfaced by the session server.
///
/// Startup errors are fatal; everything else is scoped to one session and
/// handled by dropping that session.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A required startup step failed. The process should exit.
    #[error("startup failed: {0}")]
    Startup(String),

    /// A transport-level failure on one connection.
    #[error("network error: {0}")]
    Network(String),

    /// A send targeted a session that is not in the registry.
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),

    /// The target session's outbound queue was closed or full.
    #[error("session {0} cannot accept the message")]
    SessionUnavailable(SessionId),
}

impl From<playgrid_engine::EngineError> for ServerError {
    fn from(e: playgrid_engine::EngineError) -> Self {
        ServerError::Startup(e.to_string())
    }
}

impl From<plugin_system::PluginError> for ServerError {
    fn from(e: plugin_system::PluginError) -> Self {
        ServerError::Startup(e.to_string())
    }
}
