use thiserror::Error;

use agora_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("nothing to send")]
    EmptyContent,

    #[error("no signed-in user")]
    Unauthenticated,

    #[error("could not encode record: {0}")]
    Encode(#[from] serde_json::Error),
}
