use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_types::events::{FaultKind, StoreEvent, StoreFault};
use agora_types::paths;

use crate::Database;
use crate::dispatcher::Dispatcher;
use crate::push_id::PushIdGenerator;
use crate::tree;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied at '{0}'")]
    PermissionDenied(String),

    #[error("write to '{path}' rejected: {reason}")]
    WriteRejected { path: String, reason: String },

    #[error("store disconnected")]
    Disconnected,

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Child range filter over one field, compared as strings.
/// `equal_to(v)` is the range `[v, v]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeQuery {
    pub order_by: String,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
}

impl RangeQuery {
    pub fn order_by(field: impl Into<String>) -> Self {
        Self {
            order_by: field.into(),
            ..Default::default()
        }
    }

    pub fn start_at(mut self, value: impl Into<String>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    pub fn end_at(mut self, value: impl Into<String>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    pub fn equal_to(self, value: impl Into<String>) -> Self {
        let value = value.into();
        self.start_at(value.clone()).end_at(value)
    }

    /// Children whose field starts with `prefix`.
    pub fn prefix(field: impl Into<String>, prefix: &str) -> Self {
        Self::order_by(field)
            .start_at(prefix)
            .end_at(format!("{prefix}\u{f8ff}"))
    }

    fn matches(&self, field: Option<&str>) -> bool {
        let Some(field) = field else {
            return self.start_at.is_none() && self.end_at.is_none();
        };
        self.start_at.as_deref().is_none_or(|start| field >= start)
            && self.end_at.as_deref().is_none_or(|end| field <= end)
    }

    /// Apply to the children of `value`, ordered by the field then by key.
    pub fn apply(&self, value: Option<&Value>) -> Vec<(String, Value)> {
        let Some(children) = value.and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut hits: Vec<(Option<String>, String, Value)> = children
            .iter()
            .filter_map(|(key, child)| {
                let field = child.get(&self.order_by).and_then(Value::as_str);
                self.matches(field)
                    .then(|| (field.map(str::to_string), key.clone(), child.clone()))
            })
            .collect();
        hits.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        hits.into_iter().map(|(_, key, child)| (key, child)).collect()
    }
}

/// Receiving end of a store subscription. Dropping it detaches the listener.
pub struct Listener {
    id: Uuid,
    path: String,
    rx: mpsc::UnboundedReceiver<StoreEvent>,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Listener {
    pub fn new(
        id: Uuid,
        path: impl Into<String>,
        rx: mpsc::UnboundedReceiver<StoreEvent>,
        detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            rx,
            detach: Some(Box::new(detach)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next event, or `None` once the store has closed this listener.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

/// The realtime tree store the sync layer is written against.
pub trait TreeStore: Clone + Send + Sync + 'static {
    /// Attach a listener. The current snapshot is delivered first, then a new
    /// full snapshot after every change under or above `path`.
    fn subscribe(&self, path: &str) -> Listener;

    /// Mint a fresh, chronologically sortable child key under `path`.
    fn push_child_key(&self, path: &str) -> String;

    fn read_once(&self, path: &str)
    -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Blind overwrite. `null` deletes.
    fn write(&self, path: &str, value: Value) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write only if the current value equals `expected`. Returns whether it wrote.
    fn compare_and_set(
        &self,
        path: &str,
        expected: Option<Value>,
        value: Value,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    fn query(
        &self,
        path: &str,
        query: &RangeQuery,
    ) -> impl Future<Output = Result<Vec<(String, Value)>, StoreError>> + Send;
}

#[derive(Default)]
struct Faults {
    denied: Vec<String>,
    rejected: Vec<String>,
}

/// In-process tree store. Optionally writes through to a SQLite journal so
/// the tree survives restarts.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    tree: RwLock<Value>,
    dispatcher: Arc<Dispatcher>,
    journal: Option<Arc<Database>>,
    faults: RwLock<Faults>,
    push_ids: Mutex<PushIdGenerator>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::with_root(Value::Object(Map::new()), None)
    }

    /// Open a store backed by `db`, replaying its journal.
    pub fn open(db: Arc<Database>) -> anyhow::Result<Self> {
        let rows = db.load_journal()?;
        let mut root = Value::Object(Map::new());
        for row in &rows {
            let value: Value = serde_json::from_str(&row.value)?;
            tree::set(&mut root, &row.path, value);
        }

        // Fold the replayed writes into one row so the journal stays short.
        if rows.len() > 1 {
            db.compact_journal(&root.to_string())?;
        }

        info!("Local store loaded ({} journal entries replayed)", rows.len());
        Ok(Self::with_root(root, Some(db)))
    }

    fn with_root(root: Value, journal: Option<Arc<Database>>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tree: RwLock::new(root),
                dispatcher: Arc::new(Dispatcher::new()),
                journal,
                faults: RwLock::new(Faults::default()),
                push_ids: Mutex::new(PushIdGenerator::new()),
            }),
        }
    }

    // -- Fault injection --

    /// Deny reads and writes at and below `prefix`. Live listeners there are
    /// cancelled with a permission fault.
    pub fn deny(&self, prefix: &str) {
        let prefix = paths::normalize(prefix);
        if let Ok(mut faults) = self.inner.faults.write() {
            faults.denied.push(prefix.clone());
        }
        let cancelled =
            self.inner
                .dispatcher
                .cancel(Some(&prefix), FaultKind::PermissionDenied, "permission denied");
        warn!("Denied '{}' ({} listeners cancelled)", prefix, cancelled);
    }

    /// Reject writes at and below `prefix`.
    pub fn reject_writes(&self, prefix: &str) {
        if let Ok(mut faults) = self.inner.faults.write() {
            faults.rejected.push(paths::normalize(prefix));
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.inner.faults.write() {
            *faults = Faults::default();
        }
    }

    /// Simulate losing the connection: every live listener is cancelled.
    pub fn disconnect_listeners(&self) -> usize {
        self.inner
            .dispatcher
            .cancel(None, FaultKind::Disconnected, "connection lost")
    }

    pub fn listener_count(&self) -> usize {
        self.inner.dispatcher.len()
    }

    fn check_readable(&self, path: &str) -> Result<(), StoreError> {
        let faults = self.faults()?;
        if faults.denied.iter().any(|p| paths::is_ancestor_or_self(p, path)) {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, path: &str) -> Result<(), StoreError> {
        self.check_readable(path)?;
        let faults = self.faults()?;
        if faults.rejected.iter().any(|p| paths::is_ancestor_or_self(p, path)) {
            return Err(StoreError::WriteRejected {
                path: path.to_string(),
                reason: "rejected by store".into(),
            });
        }
        Ok(())
    }

    fn faults(&self) -> Result<std::sync::RwLockReadGuard<'_, Faults>, StoreError> {
        self.inner
            .faults
            .read()
            .map_err(|_| StoreError::Database("fault table lock poisoned".into()))
    }

    /// Apply a write under the tree lock: journal, mutate, notify.
    fn apply(&self, root: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
        if let Some(db) = &self.inner.journal {
            db.append_journal(path, &value.to_string())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        tree::set(root, path, value);
        self.inner.dispatcher.notify(path, root);
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Database("tree lock poisoned".into())
}

impl TreeStore for LocalStore {
    fn subscribe(&self, path: &str) -> Listener {
        let path = paths::normalize(path);

        if let Err(e) = self.check_readable(&path) {
            warn!("Subscription to '{}' refused: {}", path, e);
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(StoreEvent::Cancelled(StoreFault {
                kind: FaultKind::PermissionDenied,
                path: path.clone(),
                message: e.to_string(),
            }));
            return Listener::new(Uuid::new_v4(), path, rx, || {});
        }

        // Register under the read lock so no write slips between the initial
        // snapshot and the registration.
        let (id, rx) = match self.inner.tree.read() {
            Ok(root) => self.inner.dispatcher.register(&path, &root),
            Err(_) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(StoreEvent::Cancelled(StoreFault {
                    kind: FaultKind::Disconnected,
                    path: path.clone(),
                    message: "tree lock poisoned".into(),
                }));
                return Listener::new(Uuid::new_v4(), path, rx, || {});
            }
        };

        let dispatcher = Arc::downgrade(&self.inner.dispatcher);
        Listener::new(id, path, rx, move || {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.unregister(id);
            }
        })
    }

    fn push_child_key(&self, path: &str) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let key = match self.inner.push_ids.lock() {
            Ok(mut generator) => generator.next_id(now),
            // Still unique, just without the ordering guarantee.
            Err(_) => Uuid::new_v4().simple().to_string(),
        };
        debug!("Push key {} under '{}'", key, path);
        key
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = paths::normalize(path);
        self.check_readable(&path)?;
        let root = self.inner.tree.read().map_err(|_| poisoned())?;
        Ok(tree::get(&root, &path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = paths::normalize(path);
        self.check_writable(&path)?;
        let mut root = self.inner.tree.write().map_err(|_| poisoned())?;
        self.apply(&mut root, &path, value)
    }

    async fn compare_and_set(
        &self,
        path: &str,
        expected: Option<Value>,
        value: Value,
    ) -> Result<bool, StoreError> {
        let path = paths::normalize(path);
        self.check_writable(&path)?;
        let mut root = self.inner.tree.write().map_err(|_| poisoned())?;
        if tree::get(&root, &path) != expected.as_ref() {
            return Ok(false);
        }
        self.apply(&mut root, &path, value)?;
        Ok(true)
    }

    async fn query(&self, path: &str, query: &RangeQuery) -> Result<Vec<(String, Value)>, StoreError> {
        let path = paths::normalize(path);
        self.check_readable(&path)?;
        let root = self.inner.tree.read().map_err(|_| poisoned())?;
        Ok(query.apply(tree::get(&root, &path)))
    }
}
