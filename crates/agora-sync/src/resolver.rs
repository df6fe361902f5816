use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tokio::sync::OnceCell;
use tracing::debug;

use agora_store::TreeStore;
use agora_types::{UserProfile, paths};

use crate::document::fetch_record;

/// Shown wherever a user id has no readable profile.
pub const UNKNOWN_USER: &str = "unknown user";

/// Anything that can turn a user id into a display name.
pub trait NameLookup {
    fn name_of(&self, user_id: &str) -> String;
}

impl NameLookup for HashMap<String, String> {
    fn name_of(&self, user_id: &str) -> String {
        self.get(user_id).cloned().unwrap_or_else(|| UNKNOWN_USER.to_string())
    }
}

type Slot = Arc<OnceCell<String>>;

/// Memoized `userId -> username` lookups for one screen.
///
/// Only hits are cached, until `forget` or drop. A missing profile or a
/// failed read is tried again on the next lookup, so authors whose profile
/// lands late heal on a later snapshot. Concurrent lookups of the same id
/// wait on one shared read.
#[derive(Clone)]
pub struct IdentityResolver<S> {
    store: S,
    cache: Arc<Mutex<HashMap<String, Slot>>>,
    reads: Arc<AtomicUsize>,
}

impl<S: TreeStore> IdentityResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: Arc::new(Mutex::new(HashMap::new())),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn slot(&self, user_id: &str) -> Slot {
        match self.cache.lock() {
            Ok(mut cache) => cache.entry(user_id.to_string()).or_default().clone(),
            // Lookups still work, just uncached.
            Err(_) => Slot::default(),
        }
    }

    async fn fetch_name(&self, user_id: &str) -> Option<String> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        match fetch_record::<_, UserProfile>(&self.store, &paths::user(user_id)).await {
            Ok(profile) => profile
                .map(|p| p.username)
                .filter(|name| !name.trim().is_empty()),
            Err(e) => {
                debug!("Could not resolve user {}: {}", user_id, e);
                None
            }
        }
    }

    /// Display name for `user_id`. A found name is read at most once.
    pub async fn resolve(&self, user_id: &str) -> String {
        let slot = self.slot(user_id);
        let name = slot
            .get_or_try_init(|| async { self.fetch_name(user_id).await.ok_or(()) })
            .await;
        match name {
            Ok(name) => name.clone(),
            Err(()) => UNKNOWN_USER.to_string(),
        }
    }

    /// Resolve every distinct id concurrently.
    pub async fn resolve_all<'a, I>(&self, user_ids: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut distinct: Vec<&str> = user_ids.into_iter().collect();
        distinct.sort_unstable();
        distinct.dedup();

        let names = join_all(distinct.iter().map(|id| self.resolve(id))).await;
        distinct
            .into_iter()
            .map(str::to_string)
            .zip(names)
            .collect()
    }

    /// Cached name, if this id has been resolved to one.
    pub fn cached(&self, user_id: &str) -> Option<String> {
        let cache = self.cache.lock().ok()?;
        cache.get(user_id)?.get().cloned()
    }

    /// Cached name or the placeholder. Never reads the store.
    pub fn name(&self, user_id: &str) -> String {
        self.cached(user_id).unwrap_or_else(|| UNKNOWN_USER.to_string())
    }

    /// Remote reads issued so far.
    pub fn remote_reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn forget(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl<S: TreeStore> NameLookup for IdentityResolver<S> {
    fn name_of(&self, user_id: &str) -> String {
        self.name(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_store::LocalStore;
    use serde_json::json;

    async fn seeded() -> LocalStore {
        let store = LocalStore::in_memory();
        store.write("users/u1", json!({ "username": "papy" })).await.unwrap();
        store.write("users/u2", json!({ "username": "mamie" })).await.unwrap();
        store
    }

    #[tokio::test]
    async fn one_read_per_distinct_id() {
        let resolver = IdentityResolver::new(seeded().await);

        let names = resolver.resolve_all(["u1", "u2", "u1", "u1", "ghost"]).await;
        assert_eq!(names["u1"], "papy");
        assert_eq!(names["u2"], "mamie");
        assert_eq!(names["ghost"], UNKNOWN_USER);
        assert_eq!(resolver.remote_reads(), 3);

        resolver.resolve("u1").await;
        assert_eq!(resolver.remote_reads(), 3);
    }

    #[tokio::test]
    async fn late_profile_is_picked_up() {
        let store = seeded().await;
        let resolver = IdentityResolver::new(store.clone());

        assert_eq!(resolver.resolve("u9").await, UNKNOWN_USER);
        assert_eq!(resolver.cached("u9"), None);

        store.write("users/u9", json!({ "username": "late" })).await.unwrap();
        assert_eq!(resolver.resolve("u9").await, "late");
        assert_eq!(resolver.name("u9"), "late");

        let reads = resolver.remote_reads();
        resolver.resolve("u9").await;
        assert_eq!(resolver.remote_reads(), reads);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_a_read() {
        let resolver = IdentityResolver::new(seeded().await);
        let (a, b) = tokio::join!(resolver.resolve("u2"), resolver.resolve("u2"));
        assert_eq!(a, "mamie");
        assert_eq!(b, "mamie");
        assert_eq!(resolver.remote_reads(), 1);
    }

    #[tokio::test]
    async fn sync_name_uses_cache_only() {
        let resolver = IdentityResolver::new(seeded().await);
        assert_eq!(resolver.name("u1"), UNKNOWN_USER);
        resolver.resolve("u1").await;
        assert_eq!(resolver.name_of("u1"), "papy");

        resolver.forget();
        assert_eq!(resolver.cached("u1"), None);
    }

    #[tokio::test]
    async fn denied_profile_reads_as_unknown() {
        let store = seeded().await;
        store.deny("users");
        let resolver = IdentityResolver::new(store.clone());
        assert_eq!(resolver.resolve("u1").await, UNKNOWN_USER);

        store.clear_faults();
        assert_eq!(resolver.resolve("u1").await, "papy");
    }
}
