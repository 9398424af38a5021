//! Session registry.
//!
//! One entry per live websocket session, keyed by the server-issued
//! [`SessionId`]. Each entry holds the sending half of that session's
//! bounded outbound queue; a per-session writer task owns the socket sink
//! and drains the queue, so a broadcast never touches a socket directly.
//!
//! Failure isolation: a full outbound queue drops the frame for that
//! session only, and a closed queue (the writer task is gone) gets the
//! session unregistered. Neither outcome is visible to any other session.

use dashmap::DashMap;
use playgrid_engine::SessionId;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle of one session.
///
/// `Connecting -> Active -> Closing -> Closed`, with `Closed` represented
/// by removal from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake finished, transport tasks not yet running.
    Connecting,
    /// Transport tasks running; eligible for broadcasts.
    Active,
    /// Teardown in progress; no further routing.
    Closing,
}

struct SessionEntry {
    outbox: mpsc::Sender<Vec<u8>>,
    remote_addr: SocketAddr,
    state: SessionState,
}

/// Registry of live sessions with broadcast fan-out.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session in the `Connecting` state.
    ///
    /// Registering an id that is already present supersedes the old entry:
    /// its outbound queue is dropped, which terminates the stale writer
    /// task, and all future traffic goes to the new entry.
    pub fn register(&self, session: SessionId, remote_addr: SocketAddr, outbox: mpsc::Sender<Vec<u8>>) {
        let entry = SessionEntry {
            outbox,
            remote_addr,
            state: SessionState::Connecting,
        };
        if self.sessions.insert(session, entry).is_some() {
            info!(%session, "session re-registered, previous entry superseded");
        } else {
            debug!(%session, %remote_addr, "session registered");
        }
    }

    /// Marks a session as fully up and eligible for broadcasts.
    pub fn activate(&self, session: SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(&session) {
            entry.state = SessionState::Active;
        }
    }

    /// Marks a session as tearing down. Broadcasts skip it from here on.
    pub fn begin_close(&self, session: SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(&session) {
            entry.state = SessionState::Closing;
        }
    }

    /// Removes a session. Safe to call for ids that are already gone.
    pub fn unregister(&self, session: SessionId) -> bool {
        let removed = self.sessions.remove(&session).is_some();
        if removed {
            info!(%session, "session unregistered");
        }
        removed
    }

    pub fn state(&self, session: SessionId) -> Option<SessionState> {
        self.sessions.get(&session).map(|e| e.state)
    }

    pub fn remote_addr(&self, session: SessionId) -> Option<SocketAddr> {
        self.sessions.get(&session).map(|e| e.remote_addr)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queues a frame for one session.
    pub fn send_to(&self, session: SessionId, frame: Vec<u8>) -> Result<(), crate::ServerError> {
        let Some(entry) = self.sessions.get(&session) else {
            return Err(crate::ServerError::UnknownSession(session));
        };
        entry
            .outbox
            .try_send(frame)
            .map_err(|_| crate::ServerError::SessionUnavailable(session))
    }

    /// Queues a frame for every active session.
    ///
    /// Per-session failures never propagate: a full queue drops this frame
    /// for that session, a closed queue unregisters the session. Returns
    /// the number of sessions the frame was queued for.
    pub fn broadcast(&self, frame: &[u8]) -> usize {
        let mut dead = Vec::new();
        let mut queued = 0;
        for entry in self.sessions.iter() {
            if entry.state != SessionState::Active {
                continue;
            }
            match entry.outbox.try_send(frame.to_vec()) {
                Ok(()) => queued += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(session = %entry.key(), "outbound queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                }
            }
        }
        for session in dead {
            debug!(%session, "outbound queue closed, removing session");
            self.unregister(session);
        }
        queued
    }
}
