//! Server assembly and lifecycle.

use crate::config::ServerConfig;
use crate::connection::SessionRegistry;
use crate::server::handlers::handle_connection;
use crate::ServerError;
use playgrid_engine::{load_entity_directory, wire, Engine, EngineConfig};
use plugin_system::PluginManager;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// The assembled session server.
///
/// Owns the engine, the session registry and the extension-module runtime.
/// Construction is cheap and infallible; everything that can fail happens
/// in [`GameServer::start`], in startup order, and any failure there is
/// fatal.
pub struct GameServer {
    config: ServerConfig,
    engine: Arc<Engine>,
    registry: Arc<SessionRegistry>,
    plugins: Arc<PluginManager>,
    shutdown: broadcast::Sender<()>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        let engine = Arc::new(Engine::new(EngineConfig {
            ingress_capacity: config.ingress_capacity,
            subscription_capacity: config.subscription_capacity,
        }));
        let plugins = Arc::new(PluginManager::new(engine.clone(), &config.plugin_directory));
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            engine,
            registry: Arc::new(SessionRegistry::new()),
            plugins,
            shutdown,
        }
    }

    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn plugins(&self) -> Arc<PluginManager> {
        self.plugins.clone()
    }

    /// Handle callers can use to stop the accept loop.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Runs the full startup sequence, then accepts connections until a
    /// shutdown signal arrives.
    ///
    /// Order matters: entity state must exist before the dispatcher runs,
    /// the state broadcast must be subscribed before any module can mutate
    /// state, and modules must be started before the listener so no client
    /// input races their topic subscriptions.
    pub async fn start(&self) -> Result<(), ServerError> {
        let loaded = load_entity_directory(self.engine.entities(), &self.config.entity_directory).await?;
        info!(
            count = loaded,
            directory = %self.config.entity_directory.display(),
            "entity definitions loaded"
        );

        self.engine.start().await?;
        self.spawn_state_broadcast();

        let started = self.plugins.load_all().await?;
        for name in &started {
            info!(plugin = %name, "extension module running");
        }

        let listener = create_listener(self.config.bind_address)?;
        info!(address = %self.config.bind_address, "listening for websocket sessions");

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let engine = self.engine.clone();
                        let registry = self.registry.clone();
                        let outbox_capacity = self.config.outbox_capacity;
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, remote_addr, engine, registry, outbox_capacity).await
                            {
                                warn!(%remote_addr, error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = shutdown_rx.recv() => {
                    info!(sessions = self.registry.len(), "shutdown signal received");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Bridges the entity-change stream onto the wire: every committed
    /// position change is encoded once and fanned out to all active
    /// sessions through their bounded outbound queues.
    fn spawn_state_broadcast(&self) {
        let mut changes = self.engine.entities().subscribe();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                let record = wire::StateRecord {
                    id: change.name,
                    ip: String::new(),
                    x: change.position.x,
                    y: change.position.y,
                };
                match wire::encode_state(&record) {
                    Ok(frame) => {
                        registry.broadcast(&frame);
                    }
                    Err(e) => error!(entity = %record.id, error = %e, "state record not encodable"),
                }
            }
        });
    }
}

/// Creates the TCP listener for the accept loop.
fn create_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::Startup(format!("socket creation failed: {e}")))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::Startup(format!("setting SO_REUSEADDR failed: {e}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::Startup(format!("setting nonblocking failed: {e}")))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::Startup(format!("binding {addr} failed: {e}")))?;
    socket
        .listen(1024)
        .map_err(|e| ServerError::Startup(format!("listening on {addr} failed: {e}")))?;
    TcpListener::from_std(socket.into())
        .map_err(|e| ServerError::Startup(format!("registering listener failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use playgrid_engine::Position;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn startup_fails_without_an_entity_directory() {
        let config = ServerConfig {
            entity_directory: "/no/such/entities".into(),
            ..ServerConfig::default()
        };
        let server = GameServer::new(config);
        assert!(matches!(server.start().await, Err(ServerError::Startup(_))));
    }

    #[tokio::test]
    async fn startup_fails_without_a_plugin_directory() {
        let entities = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            entity_directory: entities.path().to_path_buf(),
            plugin_directory: "/no/such/plugins".into(),
            ..ServerConfig::default()
        };
        let server = GameServer::new(config);
        assert!(matches!(server.start().await, Err(ServerError::Startup(_))));
    }

    #[tokio::test]
    async fn state_changes_are_broadcast_to_registered_sessions() {
        let server = GameServer::new(ServerConfig::default());
        server.spawn_state_broadcast();

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let session = playgrid_engine::SessionId::new();
        let addr = SocketAddr::from(([127, 0, 0, 1], 4000));
        server.registry().register(session, addr, tx);
        server.registry().activate(session);

        server.engine().entities().insert(playgrid_engine::EntityRecord {
            name: "player_1".to_string(),
            position: Position::new(0.0, 0.0),
            size: playgrid_engine::Size::new(32.0, 32.0),
            collision: true,
            image: None,
        });
        server.engine().entities().set_position("player_1", 10.0, 0.0);

        // Insertion broadcasts the spawn position, the move broadcasts the
        // new one.
        let frame = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let spawn = wire::decode_state(&frame).unwrap();
        assert_eq!((spawn.x, spawn.y), (0.0, 0.0));

        let frame = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let moved = wire::decode_state(&frame).unwrap();
        assert_eq!(moved.id, "player_1");
        assert_eq!(moved.ip, "");
        assert_eq!((moved.x, moved.y), (10.0, 0.0));
    }
}
