use std::future::Future;
use std::sync::{Arc, RwLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use agora_types::api::Credentials;

use crate::Database;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("badly formatted e-mail address")]
    InvalidEmail,

    #[error("password must be at least 6 characters")]
    WeakPassword,

    #[error("e-mail address already in use")]
    EmailTaken,

    #[error("wrong e-mail or password")]
    InvalidCredentials,

    #[error("authentication backend failure: {0}")]
    Internal(String),
}

/// The authentication collaborator: who is signed in, and how to change that.
pub trait AuthProvider: Clone + Send + Sync + 'static {
    fn current_user_id(&self) -> Option<String>;

    /// Returns the signed-in user id.
    fn sign_in(&self, credentials: &Credentials)
    -> impl Future<Output = Result<String, AuthError>> + Send;

    /// Creates the account and signs it in. Returns the new user id.
    fn sign_up(&self, credentials: &Credentials)
    -> impl Future<Output = Result<String, AuthError>> + Send;

    fn sign_out(&self);
}

/// Accounts in SQLite with Argon2id password hashes.
#[derive(Clone)]
pub struct LocalAuth {
    db: Arc<Database>,
    current: Arc<RwLock<Option<String>>>,
}

impl LocalAuth {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            current: Arc::new(RwLock::new(None)),
        }
    }

    fn set_current(&self, user_id: Option<String>) {
        if let Ok(mut current) = self.current.write() {
            *current = user_id;
        }
    }
}

fn internal(e: impl std::fmt::Display) -> AuthError {
    error!("Auth backend error: {}", e);
    AuthError::Internal(e.to_string())
}

fn validate(credentials: &Credentials) -> Result<(), AuthError> {
    let email = credentials.email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !valid_email {
        return Err(AuthError::InvalidEmail);
    }
    if credentials.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

impl AuthProvider for LocalAuth {
    fn current_user_id(&self) -> Option<String> {
        self.current.read().ok().and_then(|c| c.clone())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<String, AuthError> {
        let db = self.db.clone();
        let email = credentials.email.trim().to_string();
        let password = credentials.password.clone();

        // Lookup and hash verification are blocking; keep them off the runtime.
        let user_id = tokio::task::spawn_blocking(move || {
            let account = db
                .get_account_by_email(&email)
                .map_err(internal)?
                .ok_or(AuthError::InvalidCredentials)?;

            let parsed_hash = PasswordHash::new(&account.password).map_err(internal)?;
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .map_err(|_| AuthError::InvalidCredentials)?;

            Ok::<_, AuthError>(account.id)
        })
        .await
        .map_err(internal)??;

        info!("User {} signed in", user_id);
        self.set_current(Some(user_id.clone()));
        Ok(user_id)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<String, AuthError> {
        validate(credentials)?;

        let db = self.db.clone();
        let email = credentials.email.trim().to_string();
        let password = credentials.password.clone();

        let user_id = tokio::task::spawn_blocking(move || {
            if db.get_account_by_email(&email).map_err(internal)?.is_some() {
                return Err(AuthError::EmailTaken);
            }

            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(internal)?
                .to_string();

            let user_id = Uuid::new_v4().simple().to_string();
            db.create_account(&user_id, &email, &password_hash)
                .map_err(internal)?;
            Ok(user_id)
        })
        .await
        .map_err(internal)??;

        info!("Account {} created", user_id);
        self.set_current(Some(user_id.clone()));
        Ok(user_id)
    }

    fn sign_out(&self) {
        if let Some(user_id) = self.current_user_id() {
            info!("User {} signed out", user_id);
        }
        self.set_current(None);
    }
}
