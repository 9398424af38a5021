//! Websocket server: listener, handshake routing and transport loops.

mod core;
mod handlers;

pub use self::core::GameServer;
pub use self::handlers::handle_connection;
