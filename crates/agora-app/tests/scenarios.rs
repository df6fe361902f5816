use std::sync::Arc;

use agora_app::{
    AppError, ChatScreen, CommentsScreen, Config, FeedScreen, InboxScreen, PublishScreen, Route,
    Session,
};
use agora_store::{Database, LocalAuth, LocalStore};
use agora_types::api::{LikeTally, PublishRequest};

type LocalSession = Session<LocalStore, LocalAuth>;

/// Two sessions sharing one store, as two devices would.
fn two_devices() -> (LocalSession, LocalSession) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let store = LocalStore::open(db.clone()).unwrap();
    let alice = Session::new(store.clone(), LocalAuth::new(db.clone()), Config::default());
    let bob = Session::new(store, LocalAuth::new(db), Config::default());
    (alice, bob)
}

#[tokio::test]
async fn published_article_reaches_the_other_feed() {
    let (alice, bob) = two_devices();
    alice.sign_up("alice@agora.fr", "secret1").await.unwrap();
    bob.sign_up("bob@agora.fr", "secret1").await.unwrap();

    let mut feed = FeedScreen::mount(&bob).unwrap();
    assert!(feed.refresh().await);
    assert!(feed.items().is_empty());

    let (article, next) = PublishScreen::mount(&alice)
        .unwrap()
        .publish(PublishRequest { text: "hello".into(), image: None })
        .await
        .unwrap();
    assert_eq!(next, Route::Feed);

    assert!(feed.refresh().await);
    let items = feed.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].article.id, article.id);
    assert_eq!(items[0].article.text, "hello");
    assert_eq!(items[0].author_name, "alice");
    assert_eq!(items[0].tally(), LikeTally::new(false, 0));

    assert_eq!(feed.like(&article.id).await.unwrap(), LikeTally::new(true, 1));
    feed.close();
}

#[tokio::test]
async fn comment_thread_between_two_users() {
    let (alice, bob) = two_devices();
    alice.sign_up("alice@agora.fr", "secret1").await.unwrap();
    bob.sign_up("bob@agora.fr", "secret1").await.unwrap();

    let (article, _) = PublishScreen::mount(&alice)
        .unwrap()
        .publish(PublishRequest { text: "thoughts?".into(), image: None })
        .await
        .unwrap();

    let mut bob_view = CommentsScreen::mount(&bob, &article.id).await.unwrap();
    let mut alice_view = CommentsScreen::mount(&alice, &article.id).await.unwrap();
    bob_view.refresh().await;
    alice_view.refresh().await;

    bob_view.post("nice one").await.unwrap();
    assert_eq!(bob_view.items().len(), 1);

    alice_view.refresh().await;
    let seen = alice_view.items();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].author_name, "bob");
    assert_eq!(seen[0].comment.content, "nice one");
}

#[tokio::test]
async fn messages_flow_into_inbox_and_chat() {
    let (alice, bob) = two_devices();
    alice.sign_up("alice@agora.fr", "secret1").await.unwrap();
    bob.sign_up("bob@agora.fr", "secret1").await.unwrap();
    let alice_id = alice.require_user().unwrap();
    let bob_id = bob.require_user().unwrap();

    let mut chat = ChatScreen::mount(&alice, &bob_id).await.unwrap();
    chat.refresh().await;
    chat.send("coucou").await.unwrap();
    chat.send("ça va ?").await.unwrap();

    let mut inbox = InboxScreen::mount(&bob).unwrap();
    inbox.refresh().await;
    let entries = inbox.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].peer_name, "alice");
    assert_eq!(entries[0].conversation.preview, "coucou");

    let Route::Chat { peer_id } = inbox.open(&alice_id) else {
        panic!("inbox should open a chat");
    };
    let mut reply = ChatScreen::mount(&bob, &peer_id).await.unwrap();
    reply.refresh().await;
    let texts: Vec<String> = reply.thread().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["coucou", "ça va ?"]);
}

#[tokio::test]
async fn signed_out_screens_redirect_to_login() {
    let (alice, _) = two_devices();
    alice.sign_up("alice@agora.fr", "secret1").await.unwrap();
    assert_eq!(alice.sign_out(), Route::Login);

    let err = FeedScreen::mount(&alice).err().unwrap();
    assert!(matches!(err, AppError::Unauthenticated));
    assert_eq!(err.redirect(), Some(Route::Login));
    assert_eq!(InboxScreen::mount(&alice).err().unwrap().redirect(), Some(Route::Login));
}
