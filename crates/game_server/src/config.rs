//! Server configuration.

use playgrid_engine::{DEFAULT_INGRESS_CAPACITY, DEFAULT_SUBSCRIPTION_CAPACITY};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default depth of each session's outbound frame queue.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Everything the server needs to start.
///
/// The binary builds this from its TOML config and CLI flags; tests build
/// it directly.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the websocket listener binds to.
    pub bind_address: SocketAddr,
    /// Directory of JSON entity definitions loaded at startup.
    pub entity_directory: PathBuf,
    /// Directory of extension modules loaded at startup.
    pub plugin_directory: PathBuf,
    /// Depth of the shared action ingress queue.
    pub ingress_capacity: usize,
    /// Depth handed to each action or entity-change subscription.
    pub subscription_capacity: usize,
    /// Depth of each session's outbound frame queue.
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            entity_directory: PathBuf::from("entities"),
            plugin_directory: PathBuf::from("plugins"),
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}
