use thiserror::Error;

use agora_store::{AuthError, StoreError};
use agora_sync::SyncError;

use crate::route::Route;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not signed in")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Sync(SyncError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("image rejected: {0}")]
    Media(String),
}

impl AppError {
    /// Where the screen should send the user, if anywhere.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            Self::Unauthenticated => Some(Route::Login),
            _ => None,
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Unauthenticated => Self::Unauthenticated,
            e @ SyncError::EmptyContent => Self::Validation(e.to_string()),
            SyncError::Store(e) => Self::Store(e),
            other => Self::Sync(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_missing_user_redirects() {
        assert_eq!(AppError::Unauthenticated.redirect(), Some(Route::Login));
        assert_eq!(AppError::from(SyncError::Unauthenticated).redirect(), Some(Route::Login));
        assert_eq!(AppError::NotFound("article".into()).redirect(), None);
    }

    #[test]
    fn sync_errors_fold_into_app_errors() {
        assert!(matches!(AppError::from(SyncError::EmptyContent), AppError::Validation(_)));
        assert!(matches!(
            AppError::from(SyncError::Store(StoreError::Disconnected)),
            AppError::Store(StoreError::Disconnected)
        ));
    }
}
