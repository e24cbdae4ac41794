//! Move/rename reconciliation.
//!
//! Hosts report an explicit rename or move only some of the time; a drag and
//! drop usually arrives as a create plus a delete, in either order. Creates
//! are remembered by base name for a short window, and a delete whose base
//! name matches a remembered create at a different path is reported as a move
//! from the deleted path to the created one. Two unrelated files with the same
//! name touched inside the window are misread as a move; that is accepted.
//!
//! Expiry is checked lazily whenever the map is consulted, so no timer thread
//! exists.

use crate::core::group::{base_name, parent_of};
use crate::core::time::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_CORRELATION_WINDOW: Duration = Duration::from_secs(5);

/// Property name that marks a property change as a rename.
pub const NAME_PROPERTY: &str = "name";

/// Raw filesystem event as delivered by the host, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FsEvent {
    /// A property of the file at `path` changed; renames carry the old name.
    PropertyChanged {
        path: String,
        property: String,
        old_value: String,
    },
    /// The file now at `path` was moved out of `old_parent`.
    Moved { path: String, old_parent: String },
    Created { path: String },
    Deleted { path: String },
}

impl FsEvent {
    pub fn renamed(path: impl Into<String>, old_name: impl Into<String>) -> Self {
        FsEvent::PropertyChanged {
            path: path.into(),
            property: NAME_PROPERTY.to_string(),
            old_value: old_name.into(),
        }
    }
}

/// Canonical outcome for the group store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationChange {
    Moved { from: String, to: String },
    Deleted { path: String },
}

#[derive(Debug, Clone)]
struct PendingCreate {
    path: String,
    expires_at: Instant,
}

pub struct Reconciler {
    window: Duration,
    clock: Arc<dyn Clock>,
    recently_created: Mutex<HashMap<String, PendingCreate>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_WINDOW, Arc::new(SystemClock))
    }
}

impl Reconciler {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            recently_created: Mutex::new(HashMap::new()),
        }
    }

    /// Classifies `events` strictly in order. Creates yield nothing by
    /// themselves; they only shape how a later delete is read.
    pub fn reconcile(&self, events: &[FsEvent]) -> Vec<LocationChange> {
        let mut changes = Vec::new();
        for event in events {
            if let Some(change) = self.classify(event) {
                changes.push(change);
            }
        }
        changes
    }

    fn classify(&self, event: &FsEvent) -> Option<LocationChange> {
        match event {
            FsEvent::PropertyChanged {
                path,
                property,
                old_value,
            } => {
                if property != NAME_PROPERTY {
                    return None;
                }
                let from = join(parent_of(path), old_value);
                debug!(from = %from, to = %path, "rename");
                Some(LocationChange::Moved {
                    from,
                    to: path.clone(),
                })
            }
            FsEvent::Moved { path, old_parent } => {
                let from = join(old_parent, base_name(path));
                debug!(from = %from, to = %path, "move");
                Some(LocationChange::Moved {
                    from,
                    to: path.clone(),
                })
            }
            FsEvent::Created { path } => {
                let now = self.clock.now();
                let mut pending = self.pending_map();
                purge(&mut pending, now);
                pending.insert(
                    base_name(path).to_string(),
                    PendingCreate {
                        path: path.clone(),
                        expires_at: now + self.window,
                    },
                );
                debug!(path = %path, "tracking created file");
                None
            }
            FsEvent::Deleted { path } => {
                let now = self.clock.now();
                let recorded = {
                    let mut pending = self.pending_map();
                    pending
                        .remove(base_name(path))
                        .filter(|entry| entry.expires_at > now)
                };
                match recorded {
                    Some(created) if created.path != *path => {
                        debug!(from = %path, to = %created.path, "create+delete pair read as move");
                        Some(LocationChange::Moved {
                            from: path.clone(),
                            to: created.path,
                        })
                    }
                    _ => {
                        debug!(path = %path, "delete");
                        Some(LocationChange::Deleted { path: path.clone() })
                    }
                }
            }
        }
    }

    /// Drops every create whose window has elapsed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut pending = self.pending_map();
        purge(&mut pending, now)
    }

    /// Creates still eligible for pairing.
    pub fn pending(&self) -> usize {
        let now = self.clock.now();
        self.pending_map()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Forgets all tracked creates. Safe to call repeatedly.
    pub fn dispose(&self) {
        self.pending_map().clear();
    }

    fn pending_map(&self) -> MutexGuard<'_, HashMap<String, PendingCreate>> {
        // A poisoned map only ever holds fully inserted entries.
        self.recently_created
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn purge(pending: &mut HashMap<String, PendingCreate>, now: Instant) -> usize {
    let before = pending.len();
    pending.retain(|_, entry| entry.expires_at > now);
    before - pending.len()
}

fn join(parent: &str, name: &str) -> String {
    format!("{}/{}", parent, name)
}
