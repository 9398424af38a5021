//! WASD movement module.
//!
//! Binds the four movement keys under action code 1 to fixed-step moves of
//! the `player_1` entity, routed through the engine's movement rule so
//! collisions reject the step. Also tails the entity-change stream at
//! debug level, which makes a running deployment's movement visible with
//! `RUST_LOG=plugin_mover=debug`.

use async_trait::async_trait;
use playgrid_engine::router::topic_for;
use playgrid_engine::Engine;
use plugin_system::Plugin;
use std::sync::Arc;
use tracing::{debug, info};

/// Action code clients send for movement input.
const MOVE_ACTION: u16 = 1;

/// Entity this module drives.
const TARGET: &str = "player_1";

/// Distance of one movement step.
const STEP: f64 = 10.0;

/// Key name and the step it maps to, y growing upward.
const BINDINGS: [(&str, f64, f64); 4] = [
    ("W", 0.0, STEP),
    ("A", -STEP, 0.0),
    ("S", 0.0, -STEP),
    ("D", STEP, 0.0),
];

pub struct MoverPlugin;

impl MoverPlugin {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for MoverPlugin {
    fn name(&self) -> &str {
        "mover"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn start(self: Box<Self>, engine: Arc<Engine>) -> Result<(), String> {
        for (key, dx, dy) in BINDINGS {
            let mut inputs = engine
                .router()
                .subscribe(topic_for(MOVE_ACTION, key), engine.subscription_capacity());
            let engine = engine.clone();
            tokio::spawn(async move {
                while let Some(action) = inputs.recv().await {
                    let outcome = engine.attempt_move(TARGET, dx, dy);
                    if !outcome.accepted {
                        debug!(session = %action.session, key, "move blocked");
                    }
                }
            });
        }
        info!(plugin = self.name(), target = TARGET, "movement bindings registered");

        // Keeps the start task alive for the process lifetime.
        let mut changes = engine.entities().subscribe();
        while let Some(change) = changes.recv().await {
            debug!(
                entity = %change.name,
                x = change.position.x,
                y = change.position.y,
                "entity moved"
            );
        }
        Ok(())
    }
}

plugin_system::declare_plugin!(MoverPlugin, MoverPlugin::new);
