use std::sync::Arc;

use tracing::info;

use agora_store::{AuthProvider, TreeStore};
use agora_sync::{IdentityResolver, OptimisticMutator};
use agora_types::api::Credentials;
use agora_types::{UserProfile, paths};

use crate::config::Config;
use crate::error::AppError;
use crate::route::Route;

/// The collaborators every screen is built from.
#[derive(Clone)]
pub struct Session<S, A> {
    store: S,
    auth: A,
    config: Arc<Config>,
}

impl<S: TreeStore, A: AuthProvider> Session<S, A> {
    pub fn new(store: S, auth: A, config: Config) -> Self {
        Self {
            store,
            auth,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The signed-in user, or `Unauthenticated` (which redirects to login).
    pub fn require_user(&self) -> Result<String, AppError> {
        self.auth.current_user_id().ok_or(AppError::Unauthenticated)
    }

    pub fn mutator(&self) -> OptimisticMutator<S> {
        self.config.mutator(self.store.clone())
    }

    /// A fresh resolver; each screen owns one so its cache dies with it.
    pub fn resolver(&self) -> IdentityResolver<S> {
        IdentityResolver::new(self.store.clone())
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Route, AppError> {
        self.auth.sign_in(&Credentials::new(email, password)).await?;
        Ok(Route::Feed)
    }

    /// Create the account and its initial profile, named after the e-mail.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Route, AppError> {
        let credentials = Credentials::new(email.trim(), password);
        let user_id = self.auth.sign_up(&credentials).await?;

        let profile = UserProfile {
            user_id: user_id.clone(),
            username: credentials.local_part().to_string(),
            bio: String::new(),
            profile_picture_base64: None,
        };
        let value = serde_json::to_value(&profile).map_err(|e| AppError::Validation(e.to_string()))?;
        self.store.write(&paths::user(&user_id), value).await?;

        info!("Profile created for {} ({})", profile.username, user_id);
        Ok(Route::Feed)
    }

    pub fn sign_out(&self) -> Route {
        self.auth.sign_out();
        Route::Login
    }
}
