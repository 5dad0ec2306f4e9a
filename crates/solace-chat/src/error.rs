//! Error types for the conversation engine.

use solace_core::error::SolaceError;

/// Coarse classification of engine faults.
///
/// Only `InvalidInput` ever reaches a caller of the orchestrator; the other
/// kinds are absorbed into degraded output at the point they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    CollaboratorUnavailable,
    CatalogMissing,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::CollaboratorUnavailable => "collaborator_unavailable",
            ErrorKind::CatalogMissing => "catalog_missing",
        }
    }
}

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),
    #[error("transcript store unavailable: {0}")]
    TranscriptUnavailable(String),
    #[error("catalog missing: {0}")]
    CatalogMissing(String),
    #[error("session state error: {0}")]
    SessionState(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => ErrorKind::InvalidInput,
            ChatError::ClassifierUnavailable(_)
            | ChatError::TranscriptUnavailable(_)
            | ChatError::SessionState(_) => ErrorKind::CollaboratorUnavailable,
            ChatError::CatalogMissing(_) => ErrorKind::CatalogMissing,
        }
    }
}

impl From<SolaceError> for ChatError {
    fn from(err: SolaceError) -> Self {
        match err {
            SolaceError::Classifier(msg) => ChatError::ClassifierUnavailable(msg),
            SolaceError::Catalog(msg) => ChatError::CatalogMissing(msg),
            SolaceError::Io(e) => ChatError::CatalogMissing(e.to_string()),
            other => ChatError::TranscriptUnavailable(other.to_string()),
        }
    }
}
