//! The engine handle.
//!
//! [`Engine`] bundles the entity store, the action router and the movement
//! rule into the one object extension modules and the server are handed.
//! There are no process-wide singletons: whoever constructs the engine owns
//! it and passes clones of the `Arc` down.

use crate::entity::EntityStore;
use crate::error::EngineError;
use crate::movement::{AabbCollision, MoveOutcome, MovementRule};
use crate::router::ActionRouter;
use crate::{DEFAULT_INGRESS_CAPACITY, DEFAULT_SUBSCRIPTION_CAPACITY};
use std::sync::Arc;
use tracing::debug;

/// Capacities for the engine's internal queues.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared action ingress queue depth.
    pub ingress_capacity: usize,
    /// Queue depth handed to each new subscription.
    pub subscription_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ingress_capacity: DEFAULT_INGRESS_CAPACITY,
            subscription_capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
        }
    }
}

/// Handle to the core: entity state plus action routing.
///
/// Cheap to share via `Arc`; every extension module receives one at startup
/// and participates in the event graph through it alone.
pub struct Engine {
    entities: Arc<EntityStore>,
    router: Arc<ActionRouter>,
    movement: Arc<dyn MovementRule>,
    subscription_capacity: usize,
}

impl Engine {
    /// Creates an engine with the default AABB collision rule.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_movement_rule(config, Arc::new(AabbCollision))
    }

    /// Creates an engine with a caller-provided movement rule, e.g. a
    /// scripting-engine adapter.
    pub fn with_movement_rule(config: EngineConfig, movement: Arc<dyn MovementRule>) -> Self {
        Self {
            entities: Arc::new(EntityStore::new(config.subscription_capacity)),
            router: Arc::new(ActionRouter::new(config.ingress_capacity)),
            movement,
            subscription_capacity: config.subscription_capacity,
        }
    }

    /// The authoritative entity state.
    pub fn entities(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    /// The action ingress and topic router.
    pub fn router(&self) -> &Arc<ActionRouter> {
        &self.router
    }

    /// Default queue depth for subscriptions created by modules that do not
    /// pick their own.
    pub fn subscription_capacity(&self) -> usize {
        self.subscription_capacity
    }

    /// Starts the router's dispatcher task.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.router.start_dispatcher().await?;
        Ok(())
    }

    /// Proposes moving `name` by `(dx, dy)` through the movement rule and
    /// applies the result on acceptance.
    ///
    /// An unknown entity is a logged no-op reported as a rejected move,
    /// matching the store's unknown-entity mutation policy.
    pub fn attempt_move(&self, name: &str, dx: f64, dy: f64) -> MoveOutcome {
        let Some(record) = self.entities.get(name) else {
            debug!(entity = name, "attempt_move on unknown entity, ignoring");
            return MoveOutcome::rejected(0.0, 0.0);
        };
        let obstacles = self.entities.collidables_except(name);
        let outcome = self.movement.attempt_move(&record, &obstacles, dx, dy);
        if outcome.accepted {
            self.entities.set_position(name, outcome.x, outcome.y);
        }
        outcome
    }
}
