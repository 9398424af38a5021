//! Authoritative entity state with change notification.
//!
//! The [`EntityStore`] is the single source of truth for world state. All
//! mutation goes through its API; readers only ever receive clones, never a
//! reference into the table. Mutations are serialized through one mutex held
//! for the shortest possible critical section, and change notifications are
//! fanned out *after* the lock is released so a subscriber can never observe
//! a notification for a state it cannot yet read.

use crate::error::EngineError;
use crate::types::{Position, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

/// One game object: a player, a prop, a wall.
///
/// Records are owned exclusively by the store; everything outside works with
/// clones keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Stable identity, unique within the store.
    pub name: String,
    pub position: Position,
    pub size: Size,
    /// Whether other entities collide with this one.
    #[serde(default)]
    pub collision: bool,
    /// Client-side sprite reference, carried through untouched.
    #[serde(default)]
    pub image: Option<String>,
}

/// Notification emitted after an entity's position changed.
///
/// Carries the new value rather than a "go re-read" signal, so consumers are
/// not racing later mutations for the state the notification describes.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange {
    pub name: String,
    pub position: Position,
}

/// Receiving half of an entity-change subscription.
///
/// Backed by a bounded queue; when the queue is full the newest events are
/// dropped for this subscriber only. Subscriptions live for the process
/// lifetime, there is no unsubscribe.
pub struct EntityChanges {
    rx: mpsc::Receiver<EntityChange>,
}

impl EntityChanges {
    /// Waits for the next change notification. Returns `None` once the
    /// store has been dropped.
    pub async fn recv(&mut self) -> Option<EntityChange> {
        self.rx.recv().await
    }

    /// Non-blocking variant for drain loops and tests.
    pub fn try_recv(&mut self) -> Option<EntityChange> {
        self.rx.try_recv().ok()
    }
}

/// The authoritative, lock-guarded owner of all game-object state.
#[derive(Debug)]
pub struct EntityStore {
    records: Mutex<HashMap<String, EntityRecord>>,
    subscribers: Mutex<Vec<mpsc::Sender<EntityChange>>>,
    subscription_capacity: usize,
}

impl EntityStore {
    /// Creates an empty store whose future subscriptions get queues of
    /// `subscription_capacity` events.
    pub fn new(subscription_capacity: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            subscription_capacity,
        }
    }

    /// Returns a clone of the named record, or `None` if it does not exist.
    pub fn get(&self, name: &str) -> Option<EntityRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.get(name).cloned()
    }

    /// Number of records currently in the store.
    pub fn len(&self) -> usize {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts or replaces a record and notifies subscribers of its
    /// position. Extension modules use this to create entities at runtime.
    pub fn insert(&self, record: EntityRecord) {
        let change = EntityChange {
            name: record.name.clone(),
            position: record.position,
        };
        {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.insert(record.name.clone(), record);
        }
        self.notify(change);
    }

    /// Moves the named entity to `(x, y)`.
    ///
    /// Unknown names are a logged no-op: extension modules may race the
    /// entity loader, and an early mutation of a not-yet-loaded entity must
    /// not take the module down. Setting a position equal to the current one
    /// is also a no-op and emits no notification.
    pub fn set_position(&self, name: &str, x: f64, y: f64) {
        let change = {
            let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            match records.get_mut(name) {
                None => {
                    debug!(entity = name, "set_position on unknown entity, ignoring");
                    return;
                }
                Some(record) => {
                    if record.position.x == x && record.position.y == y {
                        return;
                    }
                    record.position = Position::new(x, y);
                    EntityChange {
                        name: record.name.clone(),
                        position: record.position,
                    }
                }
            }
        };
        // Lock released above; notification must never hold it.
        self.notify(change);
    }

    /// Subscribes to every future change notification, best effort.
    pub fn subscribe(&self) -> EntityChanges {
        let (tx, rx) = mpsc::channel(self.subscription_capacity);
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.push(tx);
        EntityChanges { rx }
    }

    /// Clones of every record, for initial-state pushes to new sessions.
    pub fn snapshot(&self) -> Vec<EntityRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.values().cloned().collect()
    }

    /// Clones of every collidable record except `name`, for movement rules.
    pub fn collidables_except(&self, name: &str) -> Vec<EntityRecord> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .values()
            .filter(|r| r.collision && r.name != name)
            .cloned()
            .collect()
    }

    fn notify(&self, change: EntityChange) {
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for tx in subscribers.iter() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(change.clone()) {
                trace!(entity = %change.name, "subscriber queue full, change dropped");
            }
        }
    }
}

/// On-disk shape of one entity definition file.
#[derive(Debug, Deserialize)]
struct EntityDefinition {
    name: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    is_collision: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

/// Loads every entity definition in `dir` into the store.
///
/// One JSON file per entity. A missing directory or a malformed file is a
/// startup error: the world description is assumed complete and required.
/// Returns the number of records loaded.
pub async fn load_entity_directory(
    store: &EntityStore,
    dir: impl AsRef<Path>,
) -> Result<usize, EngineError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| EngineError::EntityDirectory {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut loaded = 0usize;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|source| EngineError::EntityDirectory {
            path: dir.to_path_buf(),
            source,
        })?
    {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| EngineError::EntityDirectory {
                path: path.clone(),
                source,
            })?;
        let def: EntityDefinition = serde_json::from_slice(&data).map_err(|source| {
            EngineError::EntityDefinition {
                path: path.clone(),
                source,
            }
        })?;

        info!(entity = %def.name, path = %path.display(), "loaded entity definition");
        store.insert(EntityRecord {
            name: def.name,
            position: Position::new(def.x, def.y),
            size: Size::new(def.width, def.height),
            collision: def.is_collision,
            image: def.image,
        });
        loaded += 1;
    }

    Ok(loaded)
}
