use tracing::warn;

use agora_store::{AuthProvider, TreeStore};
use agora_sync::compose;
use agora_sync::{
    CollectionSnapshot, IdentityResolver, OptimisticMutator, RemoteCollection, ScreenScope, Settled,
};
use agora_types::{Conversation, Message, paths};

use crate::error::AppError;
use crate::route::Route;
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub conversation: Conversation,
    pub peer_name: String,
}

/// One row per person who has written to the signed-in user.
pub struct InboxScreen<S: TreeStore> {
    scope: ScreenScope,
    me: String,
    messages: RemoteCollection<Message>,
    snapshot: CollectionSnapshot<Message>,
    resolver: IdentityResolver<S>,
}

impl<S: TreeStore> InboxScreen<S> {
    pub fn mount<A: AuthProvider>(session: &Session<S, A>) -> Result<Self, AppError> {
        let me = session.require_user()?;
        let mut scope = ScreenScope::new("inbox");
        let messages = RemoteCollection::records_with_retry(
            session.store(),
            paths::MESSAGES,
            session.config().retry,
        );
        scope.track(messages.subscription());

        Ok(Self {
            scope,
            me,
            messages,
            snapshot: CollectionSnapshot::default(),
            resolver: session.resolver(),
        })
    }

    pub async fn refresh(&mut self) -> bool {
        let Some(snapshot) = self.messages.next().await else {
            return false;
        };
        let senders: Vec<String> = compose::inbox(&snapshot.items, &self.me)
            .into_iter()
            .map(|c| c.peer_id)
            .collect();
        self.resolver.resolve_all(senders.iter().map(String::as_str)).await;
        self.snapshot = snapshot;
        true
    }

    pub fn entries(&self) -> Vec<InboxEntry> {
        compose::inbox(&self.snapshot.items, &self.me)
            .into_iter()
            .map(|conversation| InboxEntry {
                peer_name: self.resolver.name(&conversation.peer_id),
                conversation,
            })
            .collect()
    }

    pub fn open(&self, peer_id: &str) -> Route {
        Route::Chat {
            peer_id: peer_id.to_string(),
        }
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}

/// The thread between the signed-in user and one peer.
pub struct ChatScreen<S: TreeStore> {
    scope: ScreenScope,
    me: String,
    peer: String,
    peer_name: String,
    messages: RemoteCollection<Message>,
    snapshot: CollectionSnapshot<Message>,
    pending: Vec<Message>,
    mutator: OptimisticMutator<S>,
}

impl<S: TreeStore> ChatScreen<S> {
    pub async fn mount<A: AuthProvider>(
        session: &Session<S, A>,
        peer_id: &str,
    ) -> Result<Self, AppError> {
        let me = session.require_user()?;
        let peer_name = session.resolver().resolve(peer_id).await;

        let mut scope = ScreenScope::new("chat");
        let messages = RemoteCollection::records_with_retry(
            session.store(),
            paths::MESSAGES,
            session.config().retry,
        );
        scope.track(messages.subscription());

        Ok(Self {
            scope,
            me,
            peer: peer_id.to_string(),
            peer_name,
            messages,
            snapshot: CollectionSnapshot::default(),
            pending: Vec::new(),
            mutator: session.mutator(),
        })
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub async fn refresh(&mut self) -> bool {
        let Some(snapshot) = self.messages.next().await else {
            return false;
        };
        compose::retain_unconfirmed(&mut self.pending, &snapshot.items);
        self.snapshot = snapshot;
        true
    }

    pub fn thread(&self) -> Vec<Message> {
        let merged = compose::merge_pending(&self.snapshot.items, &self.pending);
        compose::chat(&merged, &self.me, &self.peer)
    }

    /// Send to the peer. The message joins the thread before the write lands.
    pub async fn send(&mut self, text: &str) -> Result<Message, AppError> {
        let mutation = self.mutator.send_message(&self.me, &self.peer, text)?;
        let message = mutation.local().clone();
        self.pending.push(message.clone());

        match mutation.settle().await {
            Settled::Confirmed(m) | Settled::Diverged { local: m, .. } => Ok(m),
            Settled::RolledBack { error, .. } => {
                warn!("Message {} rolled back: {}", message.id, error);
                self.pending.retain(|p| p.id != message.id);
                Err(error.into())
            }
        }
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::session;
    use serde_json::json;

    #[tokio::test]
    async fn inbox_lists_senders_with_names() {
        let session = session();
        session.sign_up("me@x.y", "secret1").await.unwrap();
        let me = session.require_user().unwrap();
        let store = session.store();
        store.write("users/bob", json!({ "username": "bob" })).await.unwrap();
        store
            .write("messages/m1", json!({ "senderId": "bob", "receiverId": me, "text": "first", "timestamp": 1 }))
            .await
            .unwrap();
        store
            .write("messages/m2", json!({ "senderId": "bob", "receiverId": me, "text": "second", "timestamp": 2 }))
            .await
            .unwrap();

        let mut inbox = InboxScreen::mount(&session).unwrap();
        inbox.refresh().await;
        let entries = inbox.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].peer_name, "bob");
        assert_eq!(entries[0].conversation.preview, "first");
        assert_eq!(inbox.open("bob"), Route::Chat { peer_id: "bob".into() });
    }

    #[tokio::test]
    async fn sent_message_shows_once() {
        let session = session();
        session.sign_up("me@x.y", "secret1").await.unwrap();
        session.store().write("users/bob", json!({ "username": "bob" })).await.unwrap();

        let mut chat = ChatScreen::mount(&session, "bob").await.unwrap();
        assert_eq!(chat.peer_name(), "bob");
        chat.refresh().await;

        let sent = chat.send("salut").await.unwrap();
        assert_eq!(chat.thread().len(), 1);

        chat.refresh().await;
        let thread = chat.thread();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].id, sent.id);
        assert!(matches!(chat.send(" ").await, Err(AppError::Validation(_))));
        chat.close();
    }
}
