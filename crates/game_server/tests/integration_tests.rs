//! End-to-end tests over real sockets.
//!
//! Each test boots a full server (entity loading, dispatcher, state
//! broadcast, empty plugin directory) on an ephemeral port and talks to it
//! with a plain websocket client.

use futures::{SinkExt, StreamExt};
use game_server::{GameServer, ServerConfig};
use playgrid_engine::{wire, Engine};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

async fn write_player(dir: &Path) {
    tokio::fs::write(
        dir.join("player_1.json"),
        r#"{"name": "player_1", "x": 0, "y": 0, "width": 32, "height": 32, "is_collision": true}"#,
    )
    .await
    .unwrap();
}

fn free_port() -> SocketAddr {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap()
}

/// Boots a server on an ephemeral port and waits for it to accept.
async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<Engine>) {
    let addr = config.bind_address;
    let server = GameServer::new(config);
    let engine = server.engine();

    // Moves "player_1" right on every `{action: 1, key: "D"}` input, the
    // way a movement module would.
    let mut inputs = engine.router().subscribe("1_D", 16);
    let mover_engine = engine.clone();
    tokio::spawn(async move {
        while inputs.recv().await.is_some() {
            mover_engine.attempt_move("player_1", 10.0, 0.0);
        }
    });

    tokio::spawn(async move {
        server.start().await.unwrap();
    });

    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            return (addr, engine);
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("server on {addr} never came up");
}

async fn test_config() -> (ServerConfig, tempfile::TempDir, tempfile::TempDir) {
    let entities = tempfile::tempdir().unwrap();
    let plugins = tempfile::tempdir().unwrap();
    write_player(entities.path()).await;
    let config = ServerConfig {
        bind_address: free_port(),
        entity_directory: entities.path().to_path_buf(),
        plugin_directory: plugins.path().to_path_buf(),
        ..ServerConfig::default()
    };
    (config, entities, plugins)
}

async fn next_state(
    client: &mut (impl futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> wire::StateRecord {
    let reply = timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let Message::Binary(payload) = reply else {
        panic!("expected a binary state frame, got {reply:?}");
    };
    wire::decode_state(&payload).unwrap()
}

#[tokio::test]
async fn new_session_receives_current_state_without_sending() {
    let (config, _entities, _plugins) = test_config().await;
    let (addr, _engine) = start_server(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/game"))
        .await
        .unwrap();

    // No action sent: the state push alone must deliver the world.
    let record = next_state(&mut client).await;
    assert_eq!(record.id, "player_1");
    assert_eq!(record.ip, "");
    assert_eq!((record.x, record.y), (0.0, 0.0));
}

#[tokio::test]
async fn client_action_moves_the_entity_and_comes_back_as_state() {
    let (config, _entities, _plugins) = test_config().await;
    let (addr, engine) = start_server(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/game"))
        .await
        .unwrap();

    let frame = wire::encode_action(&wire::ClientAction {
        action: 1,
        key: "D".to_string(),
    })
    .unwrap();
    client.send(Message::binary(frame)).await.unwrap();

    // First the initial state push, then the committed move.
    let initial = next_state(&mut client).await;
    assert_eq!((initial.x, initial.y), (0.0, 0.0));

    let record = next_state(&mut client).await;
    assert_eq!(record.id, "player_1");
    assert_eq!(record.ip, "");
    assert_eq!((record.x, record.y), (10.0, 0.0));

    let stored = engine.entities().get("player_1").unwrap();
    assert_eq!((stored.position.x, stored.position.y), (10.0, 0.0));
}

#[tokio::test]
async fn malformed_frame_is_dropped_but_the_session_survives() {
    let (config, _entities, _plugins) = test_config().await;
    let (addr, _engine) = start_server(config).await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/game"))
        .await
        .unwrap();

    // Garbage first. The server logs it and keeps reading.
    client.send(Message::binary(vec![0xFF])).await.unwrap();

    let frame = wire::encode_action(&wire::ClientAction {
        action: 1,
        key: "D".to_string(),
    })
    .unwrap();
    client.send(Message::binary(frame)).await.unwrap();

    // Skip the initial state push; the move landing afterwards proves the
    // session survived the garbage frame.
    let _initial = next_state(&mut client).await;
    let record = next_state(&mut client).await;
    assert_eq!(record.id, "player_1");
    assert_eq!((record.x, record.y), (10.0, 0.0));
}

async fn raw_handshake(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    // The server closes the connection after a non-upgrade reply.
    let _ = timeout(Duration::from_secs(2), stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response).to_string()
}

#[tokio::test]
async fn move_action_produces_exactly_one_change_notification() {
    let engine = Arc::new(Engine::new(playgrid_engine::EngineConfig::default()));
    engine.entities().insert(playgrid_engine::EntityRecord {
        name: "player_1".to_string(),
        position: playgrid_engine::Position::new(0.0, 0.0),
        size: playgrid_engine::Size::new(32.0, 32.0),
        collision: true,
        image: None,
    });

    // Subscription opened before the action is delivered.
    let mut changes = engine.entities().subscribe();

    let mut inputs = engine.router().subscribe("1_D", 16);
    let mover_engine = engine.clone();
    tokio::spawn(async move {
        while inputs.recv().await.is_some() {
            mover_engine.entities().set_position("player_1", 10.0, 0.0);
        }
    });
    engine.start().await.unwrap();

    engine
        .router()
        .ingress()
        .submit(playgrid_engine::router::Action {
            code: 1,
            key: "D".to_string(),
            session: playgrid_engine::SessionId::new(),
        })
        .await
        .unwrap();

    let change = timeout(Duration::from_secs(1), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(change.name, "player_1");
    assert_eq!(change.position, playgrid_engine::Position::new(10.0, 0.0));

    let stored = engine.entities().get("player_1").unwrap();
    assert_eq!((stored.position.x, stored.position.y), (10.0, 0.0));

    // No further notifications for a single action.
    sleep(Duration::from_millis(50)).await;
    assert!(changes.try_recv().is_none());
}

#[tokio::test]
async fn ping_path_answers_pong_without_a_session() {
    let (config, _entities, _plugins) = test_config().await;
    let (addr, _engine) = start_server(config).await;

    let response = raw_handshake(addr, "/ping").await;
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("pong"), "got: {response}");
}

#[tokio::test]
async fn unknown_path_is_a_404() {
    let (config, _entities, _plugins) = test_config().await;
    let (addr, _engine) = start_server(config).await;

    let response = raw_handshake(addr, "/nowhere").await;
    assert!(response.starts_with("HTTP/1.1 404"), "got: {response}");
    assert!(response.contains("not found"), "got: {response}");
}
