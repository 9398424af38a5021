//! # Playgrid Game Server
//!
//! The websocket-facing half of Playgrid. It owns the TCP listener, the
//! session registry and the per-session transport tasks, and wires them to
//! the engine's action ingress and entity-change stream.
//!
//! Startup is strict: entity definitions, the dispatcher, the state
//! broadcast and every extension module must all come up before the
//! listener accepts its first connection, and any failure on that path is
//! fatal. After startup, failures are scoped to single sessions.

pub use config::{ServerConfig, DEFAULT_OUTBOX_CAPACITY};
pub use connection::{SessionRegistry, SessionState};
pub use error::ServerError;
pub use server::{handle_connection, GameServer};

pub mod config;
pub mod connection;
pub mod error;
pub mod server;
