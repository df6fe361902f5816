use std::sync::Arc;

use tracing::{info, warn};

use agora_app::{
    AppError, ChatScreen, CommentsScreen, Config, FeedScreen, InboxScreen, ProfileScreen,
    PublishScreen, SearchScreen, Session, user_detail,
};
use agora_store::{AuthProvider, Database, LocalAuth, LocalStore};
use agora_types::api::{ProfileUpdate, PublishRequest};

type LocalSession = Session<LocalStore, LocalAuth>;

/// Sign in, or create the account on first run.
async fn enter(session: &LocalSession, email: &str, password: &str) -> anyhow::Result<String> {
    match session.sign_in(email, password).await {
        Ok(_) => {}
        Err(AppError::Auth(_)) => {
            session.sign_up(email, password).await?;
        }
        Err(e) => return Err(e.into()),
    }
    session
        .auth()
        .current_user_id()
        .ok_or_else(|| anyhow::anyhow!("{email} is not signed in"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agora=debug".into()),
        )
        .init();

    // Config
    let config = Config::from_env()?;

    // Init store
    let db = Arc::new(Database::open_location(&config.db_path)?);
    let store = LocalStore::open(db.clone())?;

    // Two devices on one store
    let alice = Session::new(store.clone(), LocalAuth::new(db.clone()), config.clone());
    let bob = Session::new(store.clone(), LocalAuth::new(db), config);

    let alice_id = enter(&alice, "alice@agora.local", "alice-secret").await?;
    let bob_id = enter(&bob, "bob@agora.local", "bob-secret").await?;

    let mut profile = ProfileScreen::mount(&alice)?;
    profile.refresh().await;
    profile
        .save(ProfileUpdate {
            username: "alice".into(),
            bio: "Posting from the demo".into(),
            avatar: None,
        })
        .await?;
    profile.close();

    let mut feed = FeedScreen::mount(&bob)?;
    feed.refresh().await;

    let (article, _) = PublishScreen::mount(&alice)?
        .publish(PublishRequest {
            text: "hello from agora".into(),
            image: None,
        })
        .await?;

    feed.refresh().await;
    for item in feed.items() {
        info!(
            "[feed] {} by {}: {} ({} likes)",
            item.article.id, item.author_name, item.article.text, item.like_count
        );
    }
    let tally = feed.like(&article.id).await?;
    info!("[feed] bob liked {} -> {} likes", article.id, tally.count);

    let mut comments = CommentsScreen::mount(&bob, &article.id).await?;
    comments.refresh().await;
    comments.post("welcome!").await?;
    comments.refresh().await;
    for item in comments.items() {
        info!("[comments] {}: {}", item.author_name, item.comment.content);
    }
    comments.close();
    feed.close();

    let mut chat = ChatScreen::mount(&bob, &alice_id).await?;
    chat.refresh().await;
    chat.send("nice post").await?;
    chat.close();

    let mut inbox = InboxScreen::mount(&alice)?;
    inbox.refresh().await;
    for entry in inbox.entries() {
        info!("[inbox] {}: {}", entry.peer_name, entry.conversation.preview);
    }
    inbox.close();

    let search = SearchScreen::mount(&bob)?;
    for hit in search.search("ali").await? {
        let detail = user_detail(&bob, &hit.user_id).await?;
        info!(
            "[search] {} has {} articles",
            detail.profile.username,
            detail.articles.len()
        );
    }
    search.close();

    if store.listener_count() > 0 {
        warn!("{} listeners still attached at exit", store.listener_count());
    }
    info!("Demo finished for {} and {}", alice_id, bob_id);
    Ok(())
}
