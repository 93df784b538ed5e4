use std::time::Duration;

use medchat_shared::{ErrorKind, FieldError};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("malformed model response: {0}")]
    Malformed(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Unavailable(_) | ModelError::Timeout(_) => ErrorKind::ModelUnavailable,
            ModelError::Malformed(_) => ErrorKind::MalformedResponse,
        }
    }

    pub fn into_field_error(self, field: impl Into<String>) -> FieldError {
        FieldError {
            field: field.into(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("conversation must contain at least one message")]
    EmptyConversation,
    #[error("all {} model calls failed", .0.len())]
    AllCallsFailed(Vec<FieldError>),
}
