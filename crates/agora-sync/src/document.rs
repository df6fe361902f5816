use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use agora_store::{StoreError, TreeStore};
use agora_types::Keyed;
use agora_types::events::{StoreEvent, StoreFault};
use agora_types::paths;

use crate::collection::decode_record;
use crate::live::{Live, Subscription};
use crate::retry::RetryPolicy;

fn last_segment(path: &str) -> &str {
    paths::segments(path).last().unwrap_or_default()
}

/// Read one record. Absent and undecodable values are both `Ok(None)`;
/// only store failures are errors.
pub async fn fetch_once<S, T, F>(store: &S, path: &str, decode: F) -> Result<Option<T>, StoreError>
where
    S: TreeStore,
    F: Fn(&str, &Value) -> Option<T>,
{
    let Some(value) = store.read_once(path).await? else {
        return Ok(None);
    };
    let record = decode(last_segment(path), &value);
    if record.is_none() {
        debug!("Record at '{}' did not decode", path);
    }
    Ok(record)
}

pub async fn fetch_record<S, T>(store: &S, path: &str) -> Result<Option<T>, StoreError>
where
    S: TreeStore,
    T: DeserializeOwned + Keyed,
{
    fetch_once(store, path, decode_record::<T>).await
}

#[derive(Debug, Clone)]
pub struct DocumentSnapshot<T> {
    pub value: Option<T>,
    pub revision: u64,
    pub fault: Option<StoreFault>,
}

impl<T> Default for DocumentSnapshot<T> {
    fn default() -> Self {
        Self {
            value: None,
            revision: 0,
            fault: None,
        }
    }
}

impl<T> DocumentSnapshot<T> {
    pub fn is_loaded(&self) -> bool {
        self.revision > 0
    }
}

/// A live, decoded view of a single record.
pub struct RemoteDocument<T> {
    live: Live<DocumentSnapshot<T>>,
}

impl<T> RemoteDocument<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn subscribe<S, F>(store: &S, path: &str, decode: F) -> Self
    where
        S: TreeStore,
        F: Fn(&str, &Value) -> Option<T> + Send + 'static,
    {
        Self::subscribe_with_retry(store, path, RetryPolicy::none(), decode)
    }

    pub fn subscribe_with_retry<S, F>(store: &S, path: &str, retry: RetryPolicy, decode: F) -> Self
    where
        S: TreeStore,
        F: Fn(&str, &Value) -> Option<T> + Send + 'static,
    {
        let live = Live::spawn(
            store,
            path,
            retry,
            DocumentSnapshot::default(),
            move |state: &mut DocumentSnapshot<T>, event: &StoreEvent| match event {
                StoreEvent::Snapshot(snapshot) => {
                    state.value = snapshot
                        .value
                        .as_ref()
                        .and_then(|v| decode(last_segment(&snapshot.path), v));
                    state.revision += 1;
                    state.fault = None;
                }
                StoreEvent::Cancelled(fault) => state.fault = Some(fault.clone()),
            },
        );
        Self { live }
    }

    pub fn path(&self) -> &str {
        self.live.path()
    }

    pub fn current(&self) -> DocumentSnapshot<T> {
        self.live.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DocumentSnapshot<T>> {
        self.live.watch()
    }

    pub async fn next(&mut self) -> Option<DocumentSnapshot<T>> {
        if !self.live.changed().await {
            return None;
        }
        Some(self.live.borrow_and_update().clone())
    }

    pub fn subscription(&self) -> Subscription {
        self.live.subscription()
    }

    pub fn is_active(&self) -> bool {
        self.live.is_active()
    }

    /// Attach again after a fault, keeping the last good value.
    pub fn resubscribe(&mut self) -> Subscription {
        let mut state = self.current();
        state.fault = None;
        self.live.restart(state)
    }

    pub fn unsubscribe(self) {
        self.live.close();
    }
}

impl<T> RemoteDocument<T>
where
    T: DeserializeOwned + Keyed + Clone + Send + Sync + 'static,
{
    pub fn record<S: TreeStore>(store: &S, path: &str) -> Self {
        Self::subscribe(store, path, decode_record::<T>)
    }
}
