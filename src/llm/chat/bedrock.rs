use async_trait::async_trait;
use aws_config::{ meta::region::RegionProviderChain, BehaviorVersion };
use aws_sdk_bedrockruntime::{
    Client as BedrockRuntimeClient,
    config::Region,
    types::{
        ContentBlock,
        ContentBlockDelta,
        ConversationRole,
        ConverseOutput,
        ConverseStreamOutput,
        InferenceConfiguration,
        Message as BedrockMessage,
    },
};
use log::{ debug, info };

use super::{ create_streaming_response, BoxError, ChatClient, CompletionResponse, FragmentStream };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::{ Role, Turn };

const DEFAULT_MODEL: &str = "anthropic.claude-instant-v1";
const DEFAULT_REGION: &str = "us-east-1";

const MAX_TOKENS: i32 = 512;
const TEMPERATURE: f32 = 0.5;
const TOP_P: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct BedrockChatClient {
    client: BedrockRuntimeClient,
    model_id: String,
}

/// Wraps each turn's text in a single text content block, keeping order
/// and role.
pub fn to_bedrock_messages(turns: &[Turn]) -> Result<Vec<BedrockMessage>, BoxError> {
    turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => ConversationRole::User,
                Role::Assistant => ConversationRole::Assistant,
            };
            BedrockMessage::builder()
                .role(role)
                .content(ContentBlock::Text(turn.content.clone()))
                .build()
                .map_err(|e| -> BoxError { format!("Failed to build Bedrock message: {}", e).into() })
        })
        .collect()
}

fn inference_config() -> InferenceConfiguration {
    InferenceConfiguration::builder()
        .max_tokens(MAX_TOKENS)
        .temperature(TEMPERATURE)
        .top_p(TOP_P)
        .build()
}

impl BedrockChatClient {
    pub fn with_client(client: BedrockRuntimeClient, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    /// Builds the SDK client from the AWS environment chain. An explicit
    /// region in the config wins over `AWS_REGION`.
    pub async fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        if config.llm_type != LlmType::Bedrock {
            return Err("Invalid config type for BedrockChatClient".into());
        }
        let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(DEFAULT_REGION);
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load().await;

        let model_id = config.completion_model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        info!("Bedrock client ready: model={}, region={:?}", model_id, sdk_config.region());

        Ok(Self::with_client(BedrockRuntimeClient::new(&sdk_config), model_id))
    }
}

#[async_trait]
impl ChatClient for BedrockChatClient {
    async fn complete(&self, turns: &[Turn]) -> Result<CompletionResponse, BoxError> {
        let messages = to_bedrock_messages(turns)?;

        let response = self.client
            .converse()
            .model_id(&self.model_id)
            .set_messages(Some(messages))
            .inference_config(inference_config())
            .send().await
            .map_err(|e| format!("AWS Converse API error: {}", e))?;

        debug!("Bedrock converse response: {:?}", response);

        let message = match response.output {
            Some(ConverseOutput::Message(message)) => message,
            _ => {
                return Err("Bedrock response missing output message".into());
            }
        };

        let text = message
            .content()
            .iter()
            .find_map(|block| match block {
                ContentBlock::Text(text) => Some(text.clone()),
                _ => None,
            })
            .ok_or_else(|| "Bedrock response has no text content".to_string())?;

        Ok(CompletionResponse { response: text })
    }

    async fn stream_completion(&self, turns: &[Turn]) -> Result<FragmentStream, BoxError> {
        let messages = to_bedrock_messages(turns)?;

        let response = self.client
            .converse_stream()
            .model_id(&self.model_id)
            .set_messages(Some(messages))
            .inference_config(inference_config())
            .send().await
            .map_err(|e| format!("AWS Converse Stream API error: {}", e))?;

        Ok(
            create_streaming_response(move |tx| async move {
                let mut events = response.stream;
                loop {
                    match events.recv().await {
                        Ok(Some(ConverseStreamOutput::ContentBlockDelta(event))) => {
                            if let Some(ContentBlockDelta::Text(text)) = event.delta {
                                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(Some(ConverseStreamOutput::MessageStop(stop))) => {
                            debug!("Bedrock stream stopped: {:?}", stop.stop_reason());
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            return;
                        }
                        Err(e) => {
                            let msg = format!("Error reading from the Bedrock stream: {}", e);
                            let _ = tx.send(Err(msg.into())).await;
                            return;
                        }
                    }
                }
            })
        )
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    fn get_model(&self) -> String {
        self.model_id.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::Bedrock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_message_per_turn_with_text_block() {
        let turns = vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("order status?")];
        let messages = to_bedrock_messages(&turns).unwrap();

        assert_eq!(messages.len(), turns.len());
        let roles: Vec<&ConversationRole> = messages.iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![
            &ConversationRole::User,
            &ConversationRole::Assistant,
            &ConversationRole::User
        ]);
        for (message, turn) in messages.iter().zip(&turns) {
            assert_eq!(message.content().len(), 1);
            match &message.content()[0] {
                ContentBlock::Text(text) => assert_eq!(text, &turn.content),
                other => panic!("unexpected block: {:?}", other),
            }
        }
    }

    #[test]
    fn inference_settings_are_fixed() {
        let config = inference_config();
        assert_eq!(config.max_tokens(), Some(512));
        assert_eq!(config.temperature(), Some(0.5));
        assert_eq!(config.top_p(), Some(0.9));
    }
}
