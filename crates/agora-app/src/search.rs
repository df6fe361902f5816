use tracing::{Instrument, debug};

use agora_store::{AuthProvider, RangeQuery, TreeStore};
use agora_sync::compose;
use agora_sync::{ScreenScope, decode_record, fetch_record};
use agora_types::{Article, UserProfile, paths};

use crate::error::AppError;
use crate::route::Route;
use crate::session::Session;

fn decode_all<T>(hits: Vec<(String, serde_json::Value)>) -> Vec<T>
where
    T: serde::de::DeserializeOwned + agora_types::Keyed,
{
    hits.iter()
        .filter_map(|(key, value)| decode_record(key, value))
        .collect()
}

/// Username prefix search.
pub struct SearchScreen<S: TreeStore> {
    scope: ScreenScope,
    store: S,
}

impl<S: TreeStore> SearchScreen<S> {
    pub fn mount<A: AuthProvider>(session: &Session<S, A>) -> Result<Self, AppError> {
        session.require_user()?;
        Ok(Self {
            scope: ScreenScope::new("search"),
            store: session.store().clone(),
        })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<UserProfile>, AppError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .store
            .query(paths::USERS, &RangeQuery::prefix("username", query))
            .instrument(self.scope.span().clone())
            .await?;
        debug!("Search '{}' matched {} users", query, hits.len());
        Ok(decode_all(hits))
    }

    pub fn open(&self, user_id: &str) -> Route {
        Route::UserDetail {
            user_id: user_id.to_string(),
        }
    }

    pub fn close(mut self) {
        self.scope.close();
    }
}

#[derive(Debug, Clone)]
pub struct UserDetail {
    pub profile: UserProfile,
    /// Newest first.
    pub articles: Vec<Article>,
}

/// Another user's profile and articles.
pub async fn user_detail<S: TreeStore, A: AuthProvider>(
    session: &Session<S, A>,
    user_id: &str,
) -> Result<UserDetail, AppError> {
    session.require_user()?;
    let store = session.store();

    let profile: UserProfile = fetch_record(store, &paths::user(user_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

    let hits = store
        .query(paths::ARTICLES, &RangeQuery::order_by("userId").equal_to(user_id))
        .await?;
    let articles: Vec<Article> = decode_all(hits);

    Ok(UserDetail {
        profile,
        articles: compose::user_articles(&articles, user_id),
    })
}
