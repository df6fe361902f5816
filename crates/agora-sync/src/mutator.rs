use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use agora_store::{StoreError, TreeStore};
use agora_types::api::LikeTally;
use agora_types::{Article, Comment, Keyed, Message, UserProfile, paths};

use crate::clock::{Clock, SystemClock};
use crate::error::SyncError;

pub const ARTICLE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const COMMENT_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// What a like on an already-liked article does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LikePolicy {
    /// Likes only ever add; a repeat is a no-op.
    #[default]
    OneWay,
    /// A repeat un-likes, never going below zero.
    Toggle,
}

impl FromStr for LikePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one-way" | "oneway" => Ok(Self::OneWay),
            "toggle" => Ok(Self::Toggle),
            other => Err(format!("unknown like policy '{other}'")),
        }
    }
}

/// What a failed remote write does to local state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteFailurePolicy {
    /// Keep the optimistic value; the failure is only logged.
    Keep,
    /// Restore the previous value and hand the error to the caller.
    #[default]
    Rollback,
}

impl FromStr for WriteFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "rollback" => Ok(Self::Rollback),
            other => Err(format!("unknown write failure policy '{other}'")),
        }
    }
}

/// How a like-count change reaches the store.
pub trait LikeCounter: Clone + Send + Sync + 'static {
    /// Move the stored count of `article_id` from `previous` to `next`.
    fn commit<S: TreeStore>(
        &self,
        store: &S,
        article_id: &str,
        previous: u64,
        next: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Writes the locally computed count. Concurrent likers from the same stale
/// count overwrite each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlindCounter;

impl LikeCounter for BlindCounter {
    async fn commit<S: TreeStore>(
        &self,
        store: &S,
        article_id: &str,
        _previous: u64,
        next: u64,
    ) -> Result<(), StoreError> {
        store.write(&paths::article_likes(article_id), json!(next)).await
    }
}

/// Applies the delta to whatever is stored, retrying on contention.
#[derive(Debug, Clone, Copy)]
pub struct TransactionalCounter {
    pub max_attempts: u32,
}

impl Default for TransactionalCounter {
    fn default() -> Self {
        Self { max_attempts: 16 }
    }
}

impl LikeCounter for TransactionalCounter {
    async fn commit<S: TreeStore>(
        &self,
        store: &S,
        article_id: &str,
        previous: u64,
        next: u64,
    ) -> Result<(), StoreError> {
        let path = paths::article_likes(article_id);
        let delta = next as i64 - previous as i64;

        for attempt in 0..self.max_attempts {
            let current = store.read_once(&path).await?;
            let stored = current.as_ref().and_then(Value::as_u64).unwrap_or(0);
            let updated = (stored as i64 + delta).max(0) as u64;

            if store.compare_and_set(&path, current, json!(updated)).await? {
                return Ok(());
            }
            debug!("Like count on {} changed underneath (attempt {})", article_id, attempt + 1);
        }

        Err(StoreError::WriteRejected {
            path,
            reason: format!("still contended after {} attempts", self.max_attempts),
        })
    }
}

/// The configured counter, chosen at startup.
#[derive(Debug, Clone, Copy)]
pub enum CounterStrategy {
    Blind(BlindCounter),
    Transactional(TransactionalCounter),
}

impl Default for CounterStrategy {
    fn default() -> Self {
        Self::Blind(BlindCounter)
    }
}

impl FromStr for CounterStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blind" => Ok(Self::Blind(BlindCounter)),
            "transactional" => Ok(Self::Transactional(TransactionalCounter::default())),
            other => Err(format!("unknown like counter '{other}'")),
        }
    }
}

impl LikeCounter for CounterStrategy {
    async fn commit<S: TreeStore>(
        &self,
        store: &S,
        article_id: &str,
        previous: u64,
        next: u64,
    ) -> Result<(), StoreError> {
        match self {
            Self::Blind(c) => c.commit(store, article_id, previous, next).await,
            Self::Transactional(c) => c.commit(store, article_id, previous, next).await,
        }
    }
}

/// Outcome of a settled mutation.
#[derive(Debug)]
pub enum Settled<T> {
    Confirmed(T),
    /// The write failed but the optimistic value is kept.
    Diverged { local: T, error: StoreError },
    /// The write failed and local state goes back to `previous`
    /// (`None` when the record did not exist before).
    RolledBack {
        previous: Option<T>,
        error: StoreError,
    },
}

impl<T> Settled<T> {
    pub fn error(&self) -> Option<&StoreError> {
        match self {
            Self::Confirmed(_) => None,
            Self::Diverged { error, .. } | Self::RolledBack { error, .. } => Some(error),
        }
    }

    /// The value the screen should now show.
    pub fn into_state(self) -> Option<T> {
        match self {
            Self::Confirmed(v) | Self::Diverged { local: v, .. } => Some(v),
            Self::RolledBack { previous, .. } => previous,
        }
    }
}

/// A local change already applied, plus the remote write it fired.
///
/// Dropping it without `settle` leaves the write running in the background.
#[derive(Debug)]
pub struct Mutation<T> {
    local: T,
    previous: Option<T>,
    write: Option<JoinHandle<Result<(), StoreError>>>,
    policy: WriteFailurePolicy,
}

impl<T> Mutation<T> {
    /// Nothing changed and nothing was written.
    pub fn unchanged(value: T) -> Self {
        Self {
            local: value,
            previous: None,
            write: None,
            policy: WriteFailurePolicy::Keep,
        }
    }

    pub fn local(&self) -> &T {
        &self.local
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    pub fn is_noop(&self) -> bool {
        self.write.is_none()
    }

    pub async fn settle(self) -> Settled<T> {
        let Some(write) = self.write else {
            return Settled::Confirmed(self.local);
        };

        let error = match write.await {
            Ok(Ok(())) => return Settled::Confirmed(self.local),
            Ok(Err(e)) => e,
            Err(_) => StoreError::Disconnected,
        };

        match self.policy {
            WriteFailurePolicy::Keep => Settled::Diverged {
                local: self.local,
                error,
            },
            WriteFailurePolicy::Rollback => Settled::RolledBack {
                previous: self.previous,
                error,
            },
        }
    }
}

impl<T: Keyed> Mutation<T> {
    pub fn key(&self) -> &str {
        self.local.key()
    }
}

fn spawn_write<F>(target: String, write: F) -> JoinHandle<Result<(), StoreError>>
where
    F: Future<Output = Result<(), StoreError>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = write.await;
        match &result {
            Ok(()) => debug!("Wrote '{}'", target),
            Err(e) => warn!("Write to '{}' failed: {}", target, e),
        }
        result
    })
}

fn require_author(user_id: &str) -> Result<(), SyncError> {
    if user_id.trim().is_empty() {
        return Err(SyncError::Unauthenticated);
    }
    Ok(())
}

fn require_text(text: &str) -> Result<(), SyncError> {
    if text.trim().is_empty() {
        return Err(SyncError::EmptyContent);
    }
    Ok(())
}

/// Local-first writes. Every operation returns its new local state at once
/// and issues exactly one remote write on a spawned task.
#[derive(Clone)]
pub struct OptimisticMutator<S, C = CounterStrategy> {
    store: S,
    counter: C,
    clock: Arc<dyn Clock>,
    like_policy: LikePolicy,
    failure_policy: WriteFailurePolicy,
}

impl<S: TreeStore> OptimisticMutator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            counter: CounterStrategy::default(),
            clock: Arc::new(SystemClock),
            like_policy: LikePolicy::default(),
            failure_policy: WriteFailurePolicy::default(),
        }
    }
}

impl<S: TreeStore, C: LikeCounter> OptimisticMutator<S, C> {
    pub fn with_counter<C2: LikeCounter>(self, counter: C2) -> OptimisticMutator<S, C2> {
        OptimisticMutator {
            store: self.store,
            counter,
            clock: self.clock,
            like_policy: self.like_policy,
            failure_policy: self.failure_policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_like_policy(mut self, policy: LikePolicy) -> Self {
        self.like_policy = policy;
        self
    }

    pub fn with_failure_policy(mut self, policy: WriteFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn like_policy(&self) -> LikePolicy {
        self.like_policy
    }

    fn mutation<T>(&self, local: T, previous: Option<T>, write: JoinHandle<Result<(), StoreError>>) -> Mutation<T> {
        Mutation {
            local,
            previous,
            write: Some(write),
            policy: self.failure_policy,
        }
    }

    fn put(&self, path: String, value: Value) -> JoinHandle<Result<(), StoreError>> {
        let store = self.store.clone();
        spawn_write(path.clone(), async move { store.write(&path, value).await })
    }

    /// Like (or, under `Toggle`, un-like) an article from its local tally.
    pub fn like(&self, article_id: &str, local: LikeTally) -> Mutation<LikeTally> {
        if article_id.trim().is_empty() {
            warn!("Ignoring like without an article id");
            return Mutation::unchanged(local);
        }

        let next = match (self.like_policy, local.liked) {
            (LikePolicy::OneWay, true) => return Mutation::unchanged(local),
            (_, false) => LikeTally::new(true, local.count + 1),
            (LikePolicy::Toggle, true) => LikeTally::new(false, local.count.saturating_sub(1)),
        };

        let store = self.store.clone();
        let counter = self.counter.clone();
        let id = article_id.to_string();
        let write = spawn_write(paths::article_likes(article_id), async move {
            counter.commit(&store, &id, local.count, next.count).await
        });
        self.mutation(next, Some(local), write)
    }

    pub fn append_comment(
        &self,
        article_id: &str,
        content: &str,
        author_id: &str,
    ) -> Result<Mutation<Comment>, SyncError> {
        require_author(author_id)?;
        require_text(content)?;

        let parent = paths::comments(article_id);
        let comment = Comment {
            id: self.store.push_child_key(&parent),
            user_id: author_id.to_string(),
            content: content.to_string(),
            date: self.clock.format_local(COMMENT_DATE_FORMAT),
        };
        let value = serde_json::to_value(&comment)?;
        let write = self.put(paths::comment(article_id, &comment.id), value);
        Ok(self.mutation(comment, None, write))
    }

    pub fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<Mutation<Message>, SyncError> {
        require_author(sender_id)?;
        require_text(text)?;

        let message = Message {
            id: self.store.push_child_key(paths::MESSAGES),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
            timestamp: self.clock.now_millis(),
        };
        let value = serde_json::to_value(&message)?;
        let write = self.put(paths::message(&message.id), value);
        Ok(self.mutation(message, None, write))
    }

    /// `image` is an already-encoded payload.
    pub fn publish_article(
        &self,
        author_id: &str,
        text: &str,
        image: Option<String>,
    ) -> Result<Mutation<Article>, SyncError> {
        require_author(author_id)?;
        if image.is_none() {
            require_text(text)?;
        }

        let article = Article {
            id: self.store.push_child_key(paths::ARTICLES),
            user_id: author_id.to_string(),
            text: text.to_string(),
            image_url: image,
            date: self.clock.format_local(ARTICLE_DATE_FORMAT),
            likes: 0,
            comments: None,
        };
        let value = serde_json::to_value(&article)?;
        let write = self.put(paths::article(&article.id), value);
        Ok(self.mutation(article, None, write))
    }

    pub fn save_profile(
        &self,
        previous: Option<UserProfile>,
        profile: UserProfile,
    ) -> Result<Mutation<UserProfile>, SyncError> {
        require_author(&profile.user_id)?;
        require_text(&profile.username)?;
        require_text(&profile.bio)?;

        let value = serde_json::to_value(&profile)?;
        let write = self.put(paths::user(&profile.user_id), value);
        Ok(self.mutation(profile, previous, write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_store::LocalStore;
    use crate::clock::FixedClock;

    async fn article_with_likes(store: &LocalStore, likes: u64) {
        store
            .write("articles/a1", json!({ "userId": "u1", "text": "hi", "likes": likes }))
            .await
            .unwrap();
    }

    async fn stored_likes(store: &LocalStore) -> Option<Value> {
        store.read_once("articles/a1/likes").await.unwrap()
    }

    #[tokio::test]
    async fn like_increments_once() {
        let store = LocalStore::in_memory();
        article_with_likes(&store, 3).await;
        let mutator = OptimisticMutator::new(store.clone());

        let first = mutator.like("a1", LikeTally::new(false, 3));
        assert_eq!(*first.local(), LikeTally::new(true, 4));
        let tally = first.settle().await.into_state().unwrap();
        assert_eq!(stored_likes(&store).await, Some(json!(4)));

        let second = mutator.like("a1", tally);
        assert!(second.is_noop());
        assert_eq!(second.settle().await.into_state(), Some(LikeTally::new(true, 4)));
        assert_eq!(stored_likes(&store).await, Some(json!(4)));
    }

    #[tokio::test]
    async fn toggle_returns_to_original_count() {
        let store = LocalStore::in_memory();
        article_with_likes(&store, 0).await;
        let mutator = OptimisticMutator::new(store.clone()).with_like_policy(LikePolicy::Toggle);

        let liked = mutator.like("a1", LikeTally::default()).settle().await.into_state().unwrap();
        assert_eq!(liked, LikeTally::new(true, 1));
        let unliked = mutator.like("a1", liked).settle().await.into_state().unwrap();
        assert_eq!(unliked, LikeTally::new(false, 0));
        assert_eq!(stored_likes(&store).await, Some(json!(0)));

        let floor = mutator.like("a1", LikeTally::new(true, 0));
        assert_eq!(floor.local().count, 0);
    }

    #[tokio::test]
    async fn stale_blind_likes_lose_an_increment() {
        let store = LocalStore::in_memory();
        article_with_likes(&store, 3).await;
        let mutator = OptimisticMutator::new(store.clone());

        let a = mutator.like("a1", LikeTally::new(false, 3));
        let b = mutator.like("a1", LikeTally::new(false, 3));
        a.settle().await;
        b.settle().await;
        assert_eq!(stored_likes(&store).await, Some(json!(4)));
    }

    #[tokio::test]
    async fn stale_transactional_likes_both_count() {
        let store = LocalStore::in_memory();
        article_with_likes(&store, 3).await;
        let mutator =
            OptimisticMutator::new(store.clone()).with_counter(TransactionalCounter::default());

        let a = mutator.like("a1", LikeTally::new(false, 3));
        let b = mutator.like("a1", LikeTally::new(false, 3));
        a.settle().await;
        b.settle().await;
        assert_eq!(stored_likes(&store).await, Some(json!(5)));
    }

    #[tokio::test]
    async fn rejected_like_rolls_back_or_diverges() {
        let store = LocalStore::in_memory();
        article_with_likes(&store, 3).await;
        store.reject_writes("articles");

        let rollback = OptimisticMutator::new(store.clone());
        let settled = rollback.like("a1", LikeTally::new(false, 3)).settle().await;
        assert!(matches!(settled.error(), Some(StoreError::WriteRejected { .. })));
        assert_eq!(settled.into_state(), Some(LikeTally::new(false, 3)));

        let keep = rollback.clone().with_failure_policy(WriteFailurePolicy::Keep);
        let settled = keep.like("a1", LikeTally::new(false, 3)).settle().await;
        assert!(settled.error().is_some());
        assert_eq!(settled.into_state(), Some(LikeTally::new(true, 4)));
        assert_eq!(stored_likes(&store).await, Some(json!(3)));
    }

    #[tokio::test]
    async fn comment_is_local_first_then_written() {
        let store = LocalStore::in_memory();
        let clock = FixedClock::at_millis(1_700_000_000_000);
        let mutator = OptimisticMutator::new(store.clone()).with_clock(Arc::new(clock));

        let mutation = mutator.append_comment("a1", "nice", "u2").unwrap();
        let comment = mutation.local().clone();
        assert_eq!(comment.user_id, "u2");
        assert_eq!(comment.date, clock.format_local(COMMENT_DATE_FORMAT));
        assert_eq!(comment.date.len(), "dd/mm/yyyy hh:mm".len());

        assert!(matches!(mutation.settle().await, Settled::Confirmed(_)));
        let stored = store
            .read_once(&paths::comment("a1", &comment.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["content"], "nice");
    }

    #[tokio::test]
    async fn blank_input_is_rejected_before_any_write() {
        let store = LocalStore::in_memory();
        let mutator = OptimisticMutator::new(store.clone());

        assert!(matches!(mutator.append_comment("a1", "   ", "u1"), Err(SyncError::EmptyContent)));
        assert!(matches!(mutator.send_message("u1", "u2", ""), Err(SyncError::EmptyContent)));
        assert!(matches!(mutator.publish_article("u1", " ", None), Err(SyncError::EmptyContent)));
        assert!(matches!(mutator.send_message("", "u2", "hi"), Err(SyncError::Unauthenticated)));
        assert_eq!(store.read_once("").await.unwrap(), None);

        let image_only = mutator.publish_article("u1", "", Some("aGk=".into())).unwrap();
        assert!(image_only.settle().await.error().is_none());
    }

    #[tokio::test]
    async fn message_key_is_path_not_field() {
        let store = LocalStore::in_memory();
        let mutator = OptimisticMutator::new(store.clone()).with_clock(Arc::new(FixedClock::at_millis(42)));

        let message = mutator.send_message("u1", "u2", "salut").unwrap();
        let id = message.key().to_string();
        message.settle().await;

        let stored = store.read_once(&paths::message(&id)).await.unwrap().unwrap();
        assert_eq!(stored, json!({ "senderId": "u1", "receiverId": "u2", "text": "salut", "timestamp": 42 }));
    }
}
