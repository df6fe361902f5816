use tracing::{info, warn};

use agora_store::{AuthProvider, TreeStore};
use agora_sync::compose::{self, CommentOrder};
use agora_sync::{
    CollectionSnapshot, IdentityResolver, OptimisticMutator, RemoteCollection, ScreenScope, Settled,
    fetch_record,
};
use agora_types::{Article, Comment, paths};

use crate::error::AppError;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentItem {
    pub comment: Comment,
    pub author_name: String,
    /// Not yet echoed back by the store.
    pub pending: bool,
}

pub struct CommentsScreen<S: TreeStore> {
    scope: ScreenScope,
    article: Article,
    me: String,
    order: CommentOrder,
    comments: RemoteCollection<Comment>,
    snapshot: CollectionSnapshot<Comment>,
    pending: Vec<Comment>,
    resolver: IdentityResolver<S>,
    mutator: OptimisticMutator<S>,
}

impl<S: TreeStore> CommentsScreen<S> {
    /// Mount on an existing article; a missing parent is `NotFound`.
    pub async fn mount<A: AuthProvider>(
        session: &Session<S, A>,
        article_id: &str,
    ) -> Result<Self, AppError> {
        let me = session.require_user()?;
        let article: Article = fetch_record(session.store(), &paths::article(article_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("article {article_id}")))?;

        let mut scope = ScreenScope::new("comments");
        let comments = RemoteCollection::records_with_retry(
            session.store(),
            &paths::comments(article_id),
            session.config().retry,
        );
        scope.track(comments.subscription());

        Ok(Self {
            scope,
            article,
            me,
            order: session.config().comment_order,
            comments,
            snapshot: CollectionSnapshot::default(),
            pending: Vec::new(),
            resolver: session.resolver(),
            mutator: session.mutator(),
        })
    }

    pub fn article(&self) -> &Article {
        &self.article
    }

    pub async fn refresh(&mut self) -> bool {
        let Some(snapshot) = self.comments.next().await else {
            return false;
        };
        compose::retain_unconfirmed(&mut self.pending, &snapshot.items);
        self.resolver
            .resolve_all(snapshot.items.iter().map(|c| c.user_id.as_str()))
            .await;
        self.snapshot = snapshot;
        true
    }

    pub fn items(&self) -> Vec<CommentItem> {
        let merged = compose::merge_pending(&self.snapshot.items, &self.pending);
        compose::comments(&merged, self.order)
            .into_iter()
            .map(|comment| CommentItem {
                author_name: self.resolver.name(&comment.user_id),
                pending: self.pending.iter().any(|p| p.id == comment.id),
                comment,
            })
            .collect()
    }

    /// Post as the signed-in user. The comment is listed before the write lands.
    pub async fn post(&mut self, content: &str) -> Result<Comment, AppError> {
        let mutation = self.mutator.append_comment(&self.article.id, content, &self.me)?;
        let comment = mutation.local().clone();
        self.pending.push(comment.clone());
        // Listed under our own name right away.
        self.resolver.resolve(&self.me).await;

        match mutation.settle().await {
            Settled::Confirmed(c) => {
                info!("Comment {} posted on {}", c.id, self.article.id);
                Ok(c)
            }
            Settled::Diverged { local, .. } => Ok(local),
            Settled::RolledBack { error, .. } => {
                warn!("Comment {} rolled back: {}", comment.id, error);
                self.pending.retain(|p| p.id != comment.id);
                Err(error.into())
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}
