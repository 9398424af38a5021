//! Movement capability interface.
//!
//! Procedural movement rules (collision, scripted constraints) live outside
//! the core; the engine only calls through this narrow trait. A rule decides
//! whether a proposed displacement is accepted and where the entity actually
//! ends up.

use crate::entity::EntityRecord;

/// Result of asking a rule about a proposed move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    /// Whether the displacement was applied.
    pub accepted: bool,
    /// Final coordinates after the rule's decision.
    pub x: f64,
    pub y: f64,
}

impl MoveOutcome {
    pub fn accepted(x: f64, y: f64) -> Self {
        Self { accepted: true, x, y }
    }

    pub fn rejected(x: f64, y: f64) -> Self {
        Self {
            accepted: false,
            x,
            y,
        }
    }
}

/// Decides whether an entity may move by `(dx, dy)`.
///
/// `obstacles` is a snapshot of every other collidable record; rules must
/// not reach back into the store, so they can never hold its lock.
pub trait MovementRule: Send + Sync {
    fn attempt_move(
        &self,
        entity: &EntityRecord,
        obstacles: &[EntityRecord],
        dx: f64,
        dy: f64,
    ) -> MoveOutcome;
}

/// Rule that accepts every move unchanged.
#[derive(Debug, Default)]
pub struct Unobstructed;

impl MovementRule for Unobstructed {
    fn attempt_move(
        &self,
        entity: &EntityRecord,
        _obstacles: &[EntityRecord],
        dx: f64,
        dy: f64,
    ) -> MoveOutcome {
        MoveOutcome::accepted(entity.position.x + dx, entity.position.y + dy)
    }
}

/// Axis-aligned bounding box collision: a move landing on any collidable
/// obstacle is rejected and the entity stays put.
#[derive(Debug, Default)]
pub struct AabbCollision;

fn overlaps(x1: f64, y1: f64, w1: f64, h1: f64, x2: f64, y2: f64, w2: f64, h2: f64) -> bool {
    x1 < x2 + w2 && x1 + w1 > x2 && y1 + h1 > y2 && y1 < y2 + h2
}

impl MovementRule for AabbCollision {
    fn attempt_move(
        &self,
        entity: &EntityRecord,
        obstacles: &[EntityRecord],
        dx: f64,
        dy: f64,
    ) -> MoveOutcome {
        let new_x = entity.position.x + dx;
        let new_y = entity.position.y + dy;

        let collided = obstacles.iter().any(|other| {
            overlaps(
                new_x,
                new_y,
                entity.size.width,
                entity.size.height,
                other.position.x,
                other.position.y,
                other.size.width,
                other.size.height,
            )
        });

        if collided {
            MoveOutcome::rejected(entity.position.x, entity.position.y)
        } else {
            MoveOutcome::accepted(new_x, new_y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, Size};

    fn record(name: &str, x: f64, y: f64, w: f64, h: f64, collision: bool) -> EntityRecord {
        EntityRecord {
            name: name.to_string(),
            position: Position::new(x, y),
            size: Size::new(w, h),
            collision,
            image: None,
        }
    }

    #[test]
    fn unobstructed_applies_the_full_displacement() {
        let player = record("player_1", 5.0, 5.0, 10.0, 10.0, true);
        let outcome = Unobstructed.attempt_move(&player, &[], 10.0, -5.0);
        assert_eq!(outcome, MoveOutcome::accepted(15.0, 0.0));
    }

    #[test]
    fn aabb_rejects_a_move_into_an_obstacle() {
        let player = record("player_1", 0.0, 0.0, 10.0, 10.0, true);
        let wall = record("wall_1", 15.0, 0.0, 10.0, 10.0, true);
        let outcome = AabbCollision.attempt_move(&player, &[wall], 10.0, 0.0);
        assert!(!outcome.accepted);
        assert_eq!((outcome.x, outcome.y), (0.0, 0.0));
    }

    #[test]
    fn aabb_accepts_a_move_that_stops_short() {
        let player = record("player_1", 0.0, 0.0, 10.0, 10.0, true);
        let wall = record("wall_1", 25.0, 0.0, 10.0, 10.0, true);
        let outcome = AabbCollision.attempt_move(&player, &[wall], 10.0, 0.0);
        assert!(outcome.accepted);
        assert_eq!((outcome.x, outcome.y), (10.0, 0.0));
    }

    #[test]
    fn touching_edges_do_not_collide() {
        let player = record("player_1", 0.0, 0.0, 10.0, 10.0, true);
        let wall = record("wall_1", 20.0, 0.0, 10.0, 10.0, true);
        let outcome = AabbCollision.attempt_move(&player, &[wall], 10.0, 0.0);
        assert!(outcome.accepted);
    }
}
