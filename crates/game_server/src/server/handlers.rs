//! Per-connection transport handling.
//!
//! Each accepted socket gets a handshake with path routing, then splits
//! into two tasks: the read loop (this function) decoding binary frames
//! into the shared action ingress, and a writer task draining the
//! session's bounded outbound queue into the socket sink.

use crate::connection::SessionRegistry;
use crate::ServerError;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use playgrid_engine::router::Action;
use playgrid_engine::{wire, Engine, SessionId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// Builds the non-upgrade HTTP reply for a given request path, or `None`
/// when the path should proceed to the websocket upgrade.
fn route_response(path: &str) -> Option<ErrorResponse> {
    let (status, body) = match path {
        "/game" => return None,
        "/ping" => (StatusCode::OK, "pong"),
        _ => (StatusCode::NOT_FOUND, "not found"),
    };
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    Some(response)
}

/// Serves one accepted TCP connection until the peer goes away.
///
/// `/ping` and unknown paths are answered inside the handshake and never
/// become sessions. `/game` upgrades, registers a session and runs the
/// read loop; every exit path unregisters the session.
pub async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    engine: Arc<Engine>,
    registry: Arc<SessionRegistry>,
    outbox_capacity: usize,
) -> Result<(), ServerError> {
    let callback = |request: &Request, response: Response| match route_response(request.uri().path()) {
        None => Ok(response),
        Some(reply) => Err(reply),
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            // Covers /ping, 404s and genuinely broken handshakes alike;
            // none of them become sessions.
            debug!(%remote_addr, reason = %e, "connection ended without upgrade");
            return Ok(());
        }
    };

    let session = SessionId::new();
    let (outbox_tx, outbox_rx) = mpsc::channel(outbox_capacity);
    let (ws_sink, mut ws_reader) = ws_stream.split();

    registry.register(session, remote_addr, outbox_tx);
    tokio::spawn(write_loop(session, ws_sink, outbox_rx));
    registry.activate(session);
    push_current_state(&engine, &registry, session);
    info!(%session, %remote_addr, "session established");

    let ingress = engine.router().ingress();
    while let Some(message) = ws_reader.next().await {
        match message {
            Ok(Message::Binary(payload)) => match wire::decode_action(&payload) {
                Ok(decoded) => {
                    let action = Action {
                        code: decoded.action,
                        key: decoded.key,
                        session,
                    };
                    if ingress.submit(action).await.is_err() {
                        warn!(%session, "action ingress closed, dropping session");
                        break;
                    }
                }
                Err(e) => {
                    // Malformed input costs the sender one message, not
                    // the connection.
                    warn!(%session, error = %e, "undecodable frame dropped");
                }
            },
            Ok(Message::Close(_)) => {
                debug!(%session, "peer closed the session");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(other) => {
                debug!(%session, kind = %message_kind(&other), "non-binary frame ignored");
            }
            Err(e) => {
                debug!(%session, error = %e, "read error, dropping session");
                break;
            }
        }
    }

    registry.begin_close(session);
    registry.unregister(session);
    info!(%session, "session closed");
    Ok(())
}

/// Queues the current world state to a newly established session, so a
/// client joining a quiet server sees every entity before the first
/// mutation happens.
fn push_current_state(engine: &Arc<Engine>, registry: &Arc<SessionRegistry>, session: SessionId) {
    for record in engine.entities().snapshot() {
        let state = wire::StateRecord {
            id: record.name,
            ip: String::new(),
            x: record.position.x,
            y: record.position.y,
        };
        match wire::encode_state(&state) {
            Ok(frame) => {
                if let Err(e) = registry.send_to(session, frame) {
                    debug!(%session, error = %e, "initial state push stopped");
                    return;
                }
            }
            Err(e) => warn!(entity = %state.id, error = %e, "state record not encodable"),
        }
    }
}

/// Drains one session's outbound queue into its socket sink.
///
/// Exits when the queue closes (the session was unregistered or
/// superseded) or the first write fails; a write failure only strands
/// this session, and the failed socket surfaces in its read loop too.
async fn write_loop(
    session: SessionId,
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut outbox: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(frame) = outbox.recv().await {
        if let Err(e) = sink.send(Message::binary(frame)).await {
            debug!(%session, error = %e, "write failed, stopping writer");
            break;
        }
    }
    let _ = sink.close().await;
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "frame",
    }
}
