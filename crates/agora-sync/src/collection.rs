use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use agora_store::TreeStore;
use agora_types::Keyed;
use agora_types::events::{Snapshot, StoreEvent, StoreFault};

use crate::live::{Live, Subscription};
use crate::retry::RetryPolicy;

/// One decoded state of a live collection.
#[derive(Debug)]
pub struct CollectionSnapshot<T> {
    /// Decoded children in store order.
    pub items: Arc<Vec<T>>,
    /// Children in the last push that failed to decode.
    pub dropped: usize,
    /// Number of pushes applied so far; `0` until the first arrives.
    pub revision: u64,
    /// Set once when the subscription fails. `items` keeps the last good push.
    pub fault: Option<StoreFault>,
}

impl<T> CollectionSnapshot<T> {
    pub fn is_loaded(&self) -> bool {
        self.revision > 0
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Clone for CollectionSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            dropped: self.dropped,
            revision: self.revision,
            fault: self.fault.clone(),
        }
    }
}

impl<T> Default for CollectionSnapshot<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            dropped: 0,
            revision: 0,
            fault: None,
        }
    }
}

/// Decode one child record, filling its id from the child key when the
/// record does not carry one. `None` if the value does not fit `T`.
pub fn decode_record<T>(key: &str, value: &Value) -> Option<T>
where
    T: DeserializeOwned + Keyed,
{
    let mut record: T = serde_json::from_value(value.clone()).ok()?;
    record.assign_key(key);
    Some(record)
}

/// Decode every child of a snapshot. Returns the records and the number dropped.
pub(crate) fn decode_children<T, F>(snapshot: &Snapshot, decode: &F) -> (Vec<T>, usize)
where
    F: Fn(&str, &Value) -> Option<T>,
{
    let mut items = Vec::with_capacity(snapshot.child_count());
    let mut dropped = 0;
    for (key, value) in snapshot.children() {
        match decode(key, value) {
            Some(item) => items.push(item),
            None => {
                debug!("Dropping undecodable child '{}' under '{}'", key, snapshot.path);
                dropped += 1;
            }
        }
    }
    (items, dropped)
}

/// A live, decoded view of the children of one store path.
pub struct RemoteCollection<T> {
    live: Live<CollectionSnapshot<T>>,
}

impl<T> RemoteCollection<T>
where
    T: Send + Sync + 'static,
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
            CollectionSnapshot::default(),
            move |state: &mut CollectionSnapshot<T>, event: &StoreEvent| match event {
                StoreEvent::Snapshot(snapshot) => {
                    let (items, dropped) = decode_children(snapshot, &decode);
                    state.revision += 1;
                    debug!(
                        "'{}' rev {}: {} records, {} dropped",
                        snapshot.path,
                        state.revision,
                        items.len(),
                        dropped
                    );
                    state.items = Arc::new(items);
                    state.dropped = dropped;
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

    pub fn current(&self) -> CollectionSnapshot<T> {
        self.live.borrow().clone()
    }

    /// An independent observer of this collection.
    pub fn watch(&self) -> watch::Receiver<CollectionSnapshot<T>> {
        self.live.watch()
    }

    /// Wait for the next change. `None` once unsubscribed or after a fault.
    pub async fn next(&mut self) -> Option<CollectionSnapshot<T>> {
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

    /// Attach again after a fault. The last good items stay current and the
    /// fault is cleared; the returned subscription replaces the old one.
    pub fn resubscribe(&mut self) -> Subscription {
        let mut state = self.current();
        state.fault = None;
        self.live.restart(state)
    }

    pub fn unsubscribe(self) {
        self.live.close();
    }
}

impl<T> RemoteCollection<T>
where
    T: DeserializeOwned + Keyed + Send + Sync + 'static,
{
    /// Subscribe and decode children as `T` records.
    pub fn records<S: TreeStore>(store: &S, path: &str) -> Self {
        Self::subscribe(store, path, decode_record::<T>)
    }

    pub fn records_with_retry<S: TreeStore>(store: &S, path: &str, retry: RetryPolicy) -> Self {
        Self::subscribe_with_retry(store, path, retry, decode_record::<T>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use agora_store::LocalStore;
    use agora_types::events::FaultKind;
    use agora_types::{Article, Message, paths};
    use serde_json::json;

    async fn loaded<T: Send + Sync + 'static>(c: &mut RemoteCollection<T>) -> CollectionSnapshot<T> {
        loop {
            let snap = c.next().await.expect("collection closed");
            if snap.is_loaded() {
                return snap;
            }
        }
    }

    #[test]
    fn decode_drops_bad_children_and_assigns_keys() {
        let snap = Snapshot::new(
            "articles",
            Some(json!({
                "a1": { "userId": "u1", "text": "hi", "likes": 2 },
                "a2": { "userId": "u1", "text": "bad", "likes": -3 },
                "a3": "not an object",
            })),
        );
        let (items, dropped) = decode_children(&snap, &decode_record::<Article>);
        assert_eq!(dropped, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "a1");
        assert_eq!(items[0].likes, 2);
    }

    #[tokio::test]
    async fn snapshots_replace_whole_list() {
        let store = LocalStore::in_memory();
        let mut messages = RemoteCollection::<Message>::records(&store, paths::MESSAGES);

        let first = loaded(&mut messages).await;
        assert!(first.is_empty());

        store
            .write("messages/m1", json!({ "senderId": "a", "receiverId": "b", "text": "yo", "timestamp": 1 }))
            .await
            .unwrap();
        let second = messages.next().await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.items[0].id, "m1");
        assert_eq!(second.revision, first.revision + 1);

        store.write("messages/m1", Value::Null).await.unwrap();
        assert!(messages.next().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_notification_after_unsubscribe() {
        let store = LocalStore::in_memory();
        let mut articles = RemoteCollection::<Article>::records(&store, paths::ARTICLES);
        loaded(&mut articles).await;

        let mut observer = articles.watch();
        observer.borrow_and_update();
        articles.unsubscribe();

        store.write("articles/a1", json!({ "text": "late" })).await.unwrap();
        assert!(observer.changed().await.is_err());
        assert_eq!(observer.borrow().revision, 1);

        for _ in 0..16 {
            if store.listener_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_before_first_push_is_silent() {
        let store = LocalStore::in_memory();
        store.write("articles/a1", json!({ "text": "early" })).await.unwrap();

        let articles = RemoteCollection::<Article>::records(&store, paths::ARTICLES);
        let mut observer = articles.watch();
        articles.unsubscribe();

        store.write("articles/a2", json!({ "text": "late" })).await.unwrap();
        assert!(observer.changed().await.is_err());
        assert!(!observer.borrow().is_loaded());
    }

    #[tokio::test]
    async fn fault_is_reported_once_and_items_are_kept() {
        let store = LocalStore::in_memory();
        store.write("articles/a1", json!({ "text": "kept" })).await.unwrap();
        let mut articles = RemoteCollection::<Article>::records(&store, paths::ARTICLES);
        assert_eq!(loaded(&mut articles).await.len(), 1);

        store.deny(paths::ARTICLES);
        let faulted = articles.next().await.unwrap();
        assert_eq!(faulted.fault.as_ref().map(|f| f.kind), Some(FaultKind::PermissionDenied));
        assert_eq!(faulted.len(), 1);

        assert!(articles.next().await.is_none());
    }

    #[tokio::test]
    async fn resubscribe_after_fault_keeps_items() {
        let store = LocalStore::in_memory();
        store.write("articles/a1", json!({ "text": "kept" })).await.unwrap();
        let mut articles = RemoteCollection::<Article>::records(&store, paths::ARTICLES);
        loaded(&mut articles).await;

        store.deny(paths::ARTICLES);
        assert!(articles.next().await.unwrap().fault.is_some());
        assert!(articles.next().await.is_none());
        assert!(!articles.is_active());

        store.clear_faults();
        let subscription = articles.resubscribe();
        assert_eq!(subscription.path(), paths::ARTICLES);
        assert!(articles.is_active());
        let resumed = articles.current();
        assert!(resumed.fault.is_none());
        assert_eq!(resumed.len(), 1);

        store.write("articles/a2", json!({ "text": "new" })).await.unwrap();
        let mut snap = articles.next().await.unwrap();
        while snap.len() < 2 {
            snap = articles.next().await.unwrap();
        }
        assert!(snap.revision > resumed.revision);

        subscription.cancel();
        assert!(!articles.is_active());
    }

    #[tokio::test]
    async fn retry_resubscribes_after_disconnect() {
        let store = LocalStore::in_memory();
        let mut articles = RemoteCollection::<Article>::records_with_retry(
            &store,
            paths::ARTICLES,
            RetryPolicy::exponential(3, Duration::from_millis(1)),
        );
        let before = loaded(&mut articles).await;

        store.disconnect_listeners();
        store.write("articles/a1", json!({ "text": "after" })).await.unwrap();

        let mut snap = articles.next().await.unwrap();
        while snap.is_empty() {
            snap = articles.next().await.unwrap();
        }
        assert!(snap.fault.is_none());
        assert!(snap.revision > before.revision);
        assert_eq!(store.listener_count(), 1);
    }
}
