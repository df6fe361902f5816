//! Per-screen controllers over the sync core.
//!
//! Every screen is built from a [`Session`] (store, auth, config) and owns a
//! `ScreenScope`, so closing or dropping it releases its subscriptions.

pub mod comments;
pub mod config;
pub mod error;
pub mod feed;
pub mod messages;
pub mod profile;
pub mod publish;
pub mod route;
pub mod search;
pub mod session;

pub use comments::{CommentItem, CommentsScreen};
pub use config::Config;
pub use error::AppError;
pub use feed::FeedScreen;
pub use messages::{ChatScreen, InboxEntry, InboxScreen};
pub use profile::ProfileScreen;
pub use publish::PublishScreen;
pub use route::Route;
pub use search::{SearchScreen, UserDetail, user_detail};
pub use session::Session;
