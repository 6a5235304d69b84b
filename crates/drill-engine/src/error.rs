use drill_model::ModelError;
use drill_storage::StorageError;
use drill_types::UserId;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("messenger error: {0}")]
    Messenger(#[from] anyhow::Error),

    #[error("user {0} has no chat to deliver prompts to")]
    NoChat(UserId),
}
