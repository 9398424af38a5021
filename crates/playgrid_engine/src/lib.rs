//! # Playgrid Engine
//!
//! Core state and event-dispatch machinery for the Playgrid session server.
//! The engine owns no sockets and knows nothing about transports: it is the
//! piece every other component (the websocket server, extension modules,
//! tests) talks to.
//!
//! ## Components
//!
//! * [`EntityStore`] - authoritative, lock-guarded game-object state with
//!   change notification fan-out
//! * [`ActionRouter`] - single-funnel ingress queue plus topic-keyed
//!   fan-out to bounded subscriber queues
//! * [`wire`] - the binary codec for client actions and state broadcasts
//! * [`MovementRule`] - the narrow capability interface procedural movement
//!   rules are invoked through
//! * [`Engine`] - the handle bundling all of the above, passed to extension
//!   modules at startup
//!
//! ## Backpressure model
//!
//! Every subscription queue is a fixed-capacity channel written with a
//! non-blocking send. A slow or stalled subscriber loses events instead of
//! stalling the dispatcher or the entity store. Session read loops are the
//! only place that may block, and only on their own socket.

pub use engine::{Engine, EngineConfig};
pub use entity::{load_entity_directory, EntityChange, EntityChanges, EntityRecord, EntityStore};
pub use error::EngineError;
pub use movement::{AabbCollision, MoveOutcome, MovementRule, Unobstructed};
pub use router::{Action, ActionIngress, ActionRouter, ActionStream};
pub use types::{Position, SessionId, Size};

pub mod engine;
pub mod entity;
pub mod error;
pub mod movement;
pub mod router;
pub mod types;
pub mod wire;

/// Default capacity for subscription queues when the caller does not
/// specify one.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

/// Default capacity of the shared action ingress queue.
pub const DEFAULT_INGRESS_CAPACITY: usize = 1024;
