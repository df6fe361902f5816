use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use agora_store::{AuthProvider, TreeStore};
use agora_sync::compose::{self, FeedItem};
use agora_sync::{
    CollectionSnapshot, IdentityResolver, OptimisticMutator, RemoteCollection, ScreenScope, Settled,
};
use agora_types::api::LikeTally;
use agora_types::events::StoreFault;
use agora_types::{Article, paths};

use crate::error::AppError;
use crate::route::Route;
use crate::session::Session;

/// The article feed: newest first, authors resolved, likes applied locally.
pub struct FeedScreen<S: TreeStore> {
    scope: ScreenScope,
    articles: RemoteCollection<Article>,
    snapshot: CollectionSnapshot<Article>,
    resolver: IdentityResolver<S>,
    mutator: OptimisticMutator<S>,
    /// Articles this screen has liked. Kept for the screen's lifetime.
    liked: HashSet<String>,
    /// Local counts that win until the next snapshot arrives.
    counts: HashMap<String, u64>,
}

impl<S: TreeStore> FeedScreen<S> {
    pub fn mount<A: AuthProvider>(session: &Session<S, A>) -> Result<Self, AppError> {
        session.require_user()?;

        let mut scope = ScreenScope::new("feed");
        let articles = RemoteCollection::records_with_retry(
            session.store(),
            paths::ARTICLES,
            session.config().retry,
        );
        scope.track(articles.subscription());

        Ok(Self {
            scope,
            articles,
            snapshot: CollectionSnapshot::default(),
            resolver: session.resolver(),
            mutator: session.mutator(),
            liked: HashSet::new(),
            counts: HashMap::new(),
        })
    }

    /// Wait for the next snapshot and resolve its authors. `false` once the
    /// feed has stopped updating.
    pub async fn refresh(&mut self) -> bool {
        let Some(snapshot) = self.articles.next().await else {
            return false;
        };
        self.counts.clear();
        self.resolver
            .resolve_all(snapshot.items.iter().map(|a| a.user_id.as_str()))
            .await;
        debug!("Feed now has {} articles", snapshot.len());
        self.snapshot = snapshot;
        true
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_loaded()
    }

    pub fn fault(&self) -> Option<&StoreFault> {
        self.snapshot.fault.as_ref()
    }

    /// Attach again after a fault. The last articles stay listed meanwhile.
    pub fn resubscribe(&mut self) {
        if self.articles.is_active() {
            return;
        }
        self.scope.track(self.articles.resubscribe());
        self.snapshot = self.articles.current();
    }

    fn tallies(&self) -> HashMap<String, LikeTally> {
        self.snapshot
            .items
            .iter()
            .filter(|a| self.liked.contains(&a.id) || self.counts.contains_key(&a.id))
            .map(|a| {
                let count = self.counts.get(&a.id).copied().unwrap_or(a.likes);
                (a.id.clone(), LikeTally::new(self.liked.contains(&a.id), count))
            })
            .collect()
    }

    pub fn items(&self) -> Vec<FeedItem> {
        compose::feed(&self.snapshot.items, &self.resolver, &self.tallies())
    }

    fn tally_of(&self, article_id: &str) -> Option<LikeTally> {
        let article = self.snapshot.items.iter().find(|a| a.id == article_id)?;
        let count = self.counts.get(article_id).copied().unwrap_or(article.likes);
        Some(LikeTally::new(self.liked.contains(article_id), count))
    }

    fn apply(&mut self, article_id: &str, tally: LikeTally) {
        if tally.liked {
            self.liked.insert(article_id.to_string());
        } else {
            self.liked.remove(article_id);
        }
        self.counts.insert(article_id.to_string(), tally.count);
    }

    /// Like from the current local state. The change is visible in `items`
    /// before the write lands.
    pub async fn like(&mut self, article_id: &str) -> Result<LikeTally, AppError> {
        let current = self
            .tally_of(article_id)
            .ok_or_else(|| AppError::NotFound(format!("article {article_id}")))?;

        let mutation = self.mutator.like(article_id, current);
        if mutation.is_noop() {
            return Ok(current);
        }
        self.apply(article_id, *mutation.local());

        match mutation.settle().await {
            Settled::Confirmed(tally) | Settled::Diverged { local: tally, .. } => Ok(tally),
            Settled::RolledBack { previous, error } => {
                warn!("Like on {} rolled back: {}", article_id, error);
                self.apply(article_id, previous.unwrap_or(current));
                Err(error.into())
            }
        }
    }

    pub fn open_comments(&self, article_id: &str) -> Route {
        Route::Comments {
            article_id: article_id.to_string(),
        }
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}
