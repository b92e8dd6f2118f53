use thiserror::Error;

/// Shape violations in an incoming conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("A conversation must start with a user message. Try again with a conversation that starts with a user message.")]
    Empty,

    #[error("A conversation must start with a user message. Try again with a conversation that starts with a user message.")]
    MustStartWithUser,

    #[error("A conversation must alternate between user and assistant roles. Make sure the conversation alternates between user and assistant roles and try again.")]
    MustAlternate { index: usize },
}

/// Streaming text can only grow an assistant reply at the end.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("conversation has no turns to append to")]
    NoTurn,

    #[error("last turn is not an assistant turn")]
    NotAssistant,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Upstream model request failed: {0}")]
    Upstream(Box<dyn std::error::Error + Send + Sync>),

    #[error("Model stream failed: {0}")]
    Stream(Box<dyn std::error::Error + Send + Sync>),
}

impl RelayError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::Validation(_))
    }
}
