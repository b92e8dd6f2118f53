use serde::{ Deserialize, Serialize };
use std::fmt;

use crate::error::{ AppendError, ValidationError };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Buffered reply body of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
}

/// Ordered dialogue, oldest turn first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self { turns: vec![Turn::assistant(greeting)] }
    }

    /// Checks the shape a model provider accepts: non-empty, user first,
    /// strictly alternating roles.
    pub fn validate(turns: &[Turn]) -> Result<(), ValidationError> {
        let first = turns.first().ok_or(ValidationError::Empty)?;
        if first.role != Role::User {
            return Err(ValidationError::MustStartWithUser);
        }
        for (index, pair) in turns.windows(2).enumerate() {
            if pair[0].role == pair[1].role {
                return Err(ValidationError::MustAlternate { index: index + 1 });
            }
        }
        Ok(())
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Grows the reply currently being streamed into the last turn.
    pub fn push_fragment(&mut self, fragment: &str) -> Result<(), AppendError> {
        let last = self.turns.last_mut().ok_or(AppendError::NoTurn)?;
        if last.role != Role::Assistant {
            return Err(AppendError::NotAssistant);
        }
        last.content.push_str(fragment);
        Ok(())
    }

    /// Overwrites the content of the last assistant turn.
    pub fn replace_last(&mut self, content: impl Into<String>) -> Result<(), AppendError> {
        let last = self.turns.last_mut().ok_or(AppendError::NoTurn)?;
        if last.role != Role::Assistant {
            return Err(AppendError::NotAssistant);
        }
        last.content = content.into();
        Ok(())
    }

    /// Turns to send upstream. Leading assistant turns (the greeting) are
    /// dropped since providers require the user to speak first.
    pub fn request_history(&self) -> Vec<Turn> {
        self.turns
            .iter()
            .skip_while(|t| t.role == Role::Assistant)
            .cloned()
            .collect()
    }
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}
