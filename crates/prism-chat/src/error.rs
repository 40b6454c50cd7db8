//! Error types for the chat engine.

use prism_core::error::PrismError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat is disabled")]
    Disabled,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("session not found: {0}")]
    SessionNotFound(uuid::Uuid),
    /// The session exists but is not in a state that accepts this call:
    /// deactivated, or already awaiting a reply.
    #[error("invalid session state: {0}")]
    InvalidSessionState(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<PrismError> for ChatError {
    fn from(err: PrismError) -> Self {
        ChatError::StorageError(err.to_string())
    }
}

impl From<ChatError> for PrismError {
    fn from(err: ChatError) -> Self {
        PrismError::Chat(err.to_string())
    }
}
