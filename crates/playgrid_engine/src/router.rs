//! Action ingress and topic fan-out.
//!
//! Every session read loop pushes decoded actions into one shared bounded
//! queue. A single dispatcher task drains it, which fixes a strict global
//! order over actions exactly as they finish decoding, however many
//! connections are live. Fan-out to topic subscribers is non-blocking: a
//! full subscriber queue loses the event rather than stalling the pipeline.

use crate::error::EngineError;
use crate::types::SessionId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// One decoded client input event. Consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    /// Numeric action code from the wire. Opaque to the router.
    pub code: u16,
    /// Key identifier from the wire. Opaque to the router.
    pub key: String,
    /// The session that produced this action.
    pub session: SessionId,
}

impl Action {
    /// The routing key subscribers match on: `"{code}_{key}"`.
    pub fn topic(&self) -> String {
        topic_for(self.code, &self.key)
    }
}

/// Builds the routing key for an action code / key identifier pair.
pub fn topic_for(code: u16, key: &str) -> String {
    format!("{code}_{key}")
}

/// Cloneable producer handle onto the shared ingress queue.
///
/// Held by every session read loop; many producers, one consumer.
#[derive(Debug, Clone)]
pub struct ActionIngress {
    tx: mpsc::Sender<Action>,
}

impl ActionIngress {
    /// Queues an action for dispatch, preserving this producer's submit
    /// order. Errors only once the dispatcher is gone.
    pub async fn submit(&self, action: Action) -> Result<(), EngineError> {
        self.tx
            .send(action)
            .await
            .map_err(|_| EngineError::IngressClosed)
    }
}

/// Receiving half of one topic subscription.
pub struct ActionStream {
    rx: mpsc::Receiver<Action>,
}

impl ActionStream {
    /// Waits for the next action on this topic.
    pub async fn recv(&mut self) -> Option<Action> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Action> {
        self.rx.try_recv().ok()
    }
}

/// Single-consumer funnel turning decoded actions into per-topic delivery.
#[derive(Debug)]
pub struct ActionRouter {
    ingress_tx: mpsc::Sender<Action>,
    // Taken exactly once when the dispatcher starts.
    ingress_rx: Mutex<Option<mpsc::Receiver<Action>>>,
    subscribers: Arc<DashMap<String, Vec<mpsc::Sender<Action>>>>,
}

impl ActionRouter {
    /// Creates a router with an ingress queue of `ingress_capacity` actions.
    pub fn new(ingress_capacity: usize) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::channel(ingress_capacity);
        Self {
            ingress_tx,
            ingress_rx: Mutex::new(Some(ingress_rx)),
            subscribers: Arc::new(DashMap::new()),
        }
    }

    /// Producer handle for session read loops.
    pub fn ingress(&self) -> ActionIngress {
        ActionIngress {
            tx: self.ingress_tx.clone(),
        }
    }

    /// Subscribes to a topic with a bounded queue of `capacity` actions.
    ///
    /// Subscriptions live for the process lifetime; there is no
    /// unsubscribe.
    pub fn subscribe(&self, topic: impl Into<String>, capacity: usize) -> ActionStream {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribers.entry(topic.into()).or_default().push(tx);
        ActionStream { rx }
    }

    /// Number of subscriptions currently registered for `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers.get(topic).map(|v| v.len()).unwrap_or(0)
    }

    /// Starts the dispatcher task draining the ingress queue.
    ///
    /// May be called once; the second call reports
    /// [`EngineError::DispatcherRunning`].
    pub async fn start_dispatcher(&self) -> Result<JoinHandle<()>, EngineError> {
        let rx = self
            .ingress_rx
            .lock()
            .await
            .take()
            .ok_or(EngineError::DispatcherRunning)?;
        let subscribers = self.subscribers.clone();
        Ok(tokio::spawn(dispatch_loop(rx, subscribers)))
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<Action>,
    subscribers: Arc<DashMap<String, Vec<mpsc::Sender<Action>>>>,
) {
    while let Some(action) = rx.recv().await {
        let topic = action.topic();
        let Some(topic_subscribers) = subscribers.get(&topic) else {
            // Legitimately "no one currently cares about this input".
            debug!(topic, session = %action.session, "no subscribers for topic, action dropped");
            continue;
        };
        for tx in topic_subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(action.clone()) {
                trace!(topic, "subscriber queue full, action dropped");
            }
        }
    }
}
