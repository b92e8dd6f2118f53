use crate::error::RelayError;
use crate::llm::chat::{ new_client, BoxError, ChatClient, FragmentStream };
use crate::llm::LlmConfig;
use crate::models::chat::{ Conversation, Turn };

use futures::TryStreamExt;
use log::{ info, warn, error };
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// How the relay hands the model's reply back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Buffered,
    Streaming,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Buffered => write!(f, "buffered"),
            ResponseMode::Streaming => write!(f, "streaming"),
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buffered" => Ok(ResponseMode::Buffered),
            "streaming" | "stream" => Ok(ResponseMode::Streaming),
            _ => Err(format!("Unsupported response mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub llm: LlmConfig,
    pub response_mode: ResponseMode,
}

pub enum RelayReply {
    Text(String),
    Fragments(FragmentStream),
}

impl fmt::Debug for RelayReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayReply::Text(text) => f.debug_tuple("Text").field(text).finish(),
            RelayReply::Fragments(_) => f.write_str("Fragments(..)"),
        }
    }
}

/// Stateless bridge between a validated conversation and the configured
/// model provider.
#[derive(Clone)]
pub struct ChatRelay {
    client: Arc<dyn ChatClient>,
    mode: ResponseMode,
}

impl ChatRelay {
    pub fn new(client: Arc<dyn ChatClient>, mode: ResponseMode) -> Self {
        Self { client, mode }
    }

    pub async fn from_config(config: &RelayConfig) -> Result<Self, BoxError> {
        let client = new_client(&config.llm).await?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={:?}, Mode={}",
            config.llm.llm_type,
            client.get_model(),
            config.llm.base_url.as_deref().unwrap_or("adapter default"),
            config.response_mode
        );
        if config.response_mode == ResponseMode::Streaming && !client.supports_native_streaming() {
            warn!("{} has no native streaming; replies arrive as one fragment", config.llm.llm_type);
        }
        Ok(Self::new(client, config.response_mode))
    }

    /// Validates `turns` and forwards them to the provider. Nothing is sent
    /// upstream unless validation passes. Failures before the first fragment
    /// are returned as `RelayError::Upstream` for the caller to log.
    pub async fn send_conversation(&self, turns: &[Turn]) -> Result<RelayReply, RelayError> {
        Conversation::validate(turns)?;

        match self.mode {
            ResponseMode::Buffered => {
                let completion = self.client.complete(turns).await.map_err(RelayError::Upstream)?;
                Ok(RelayReply::Text(completion.response))
            }
            ResponseMode::Streaming => {
                let stream = self.client
                    .stream_completion(turns).await
                    .map_err(RelayError::Upstream)?;
                let stream = stream.map_err(|e| {
                    error!("Model stream failed: {}", e);
                    Box::new(RelayError::Stream(e)) as BoxError
                });
                Ok(RelayReply::Fragments(Box::pin(stream)))
            }
        }
    }
}
