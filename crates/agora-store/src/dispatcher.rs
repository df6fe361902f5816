use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use agora_types::events::{FaultKind, Snapshot, StoreEvent, StoreFault};
use agora_types::paths;

use crate::tree;

struct Registration {
    path: String,
    tx: mpsc::UnboundedSender<StoreEvent>,
}

/// Tracks live listeners and fans snapshots out to them.
///
/// Uses a blocking mutex: registrations are removed from `Drop`, which
/// cannot await.
pub(crate) struct Dispatcher {
    listeners: Mutex<HashMap<Uuid, Registration>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a listener and queue its initial snapshot.
    pub fn register(
        &self,
        path: &str,
        root: &Value,
    ) -> (Uuid, mpsc::UnboundedReceiver<StoreEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StoreEvent::Snapshot(snapshot_at(root, path)));

        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.insert(
                id,
                Registration {
                    path: path.to_string(),
                    tx,
                },
            );
        }
        debug!("Listener {} attached to '{}'", id, path);
        (id, rx)
    }

    pub fn unregister(&self, id: Uuid) {
        if let Ok(mut listeners) = self.listeners.lock() {
            if listeners.remove(&id).is_some() {
                debug!("Listener {} detached", id);
            }
        }
    }

    /// Deliver fresh snapshots to every listener whose path overlaps `written`.
    pub fn notify(&self, written: &str, root: &Value) {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };

        let mut closed = Vec::new();
        for (id, reg) in listeners.iter() {
            if !paths::overlaps(&reg.path, written) {
                continue;
            }
            trace!("Snapshot of '{}' to listener {}", reg.path, id);
            if reg.tx.send(StoreEvent::Snapshot(snapshot_at(root, &reg.path))).is_err() {
                closed.push(*id);
            }
        }

        for id in closed {
            listeners.remove(&id);
        }
    }

    /// Cancel listeners under `prefix` (all of them for `None`). Each gets
    /// exactly one `Cancelled` event and is then dropped from the registry.
    pub fn cancel(&self, prefix: Option<&str>, kind: FaultKind, message: &str) -> usize {
        let Ok(mut listeners) = self.listeners.lock() else {
            return 0;
        };

        let doomed: Vec<Uuid> = listeners
            .iter()
            .filter(|(_, reg)| prefix.is_none_or(|p| paths::is_ancestor_or_self(p, &reg.path)))
            .map(|(id, _)| *id)
            .collect();

        for id in &doomed {
            if let Some(reg) = listeners.remove(id) {
                let _ = reg.tx.send(StoreEvent::Cancelled(StoreFault {
                    kind,
                    path: reg.path.clone(),
                    message: message.to_string(),
                }));
            }
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().map_or(0, |l| l.len())
    }
}

pub(crate) fn snapshot_at(root: &Value, path: &str) -> Snapshot {
    Snapshot::new(path, tree::get(root, path).cloned())
}
