use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ create_streaming_response, BoxError, ChatClient, CompletionResponse, FragmentStream, LineBuffer };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::Turn;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    #[serde(rename = "finish_reason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

/// What a single server-sent-event line means for the reply.
#[derive(Debug, PartialEq)]
pub enum SseLine {
    Fragments(Vec<String>),
    Done,
    Skip,
}

pub fn to_openai_messages(turns: &[Turn]) -> Vec<OpenAIMessage> {
    turns
        .iter()
        .map(|turn| OpenAIMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        })
        .collect()
}

pub fn parse_sse_line(line: &str) -> SseLine {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim_start(),
        None => {
            return SseLine::Skip;
        }
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            let mut fragments = Vec::new();
            let mut finished = false;
            for choice in stream_resp.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        fragments.push(content);
                    }
                }
                if choice.finish_reason.as_deref() == Some("stop") {
                    finished = true;
                }
            }
            if finished && fragments.is_empty() {
                SseLine::Done
            } else {
                SseLine::Fragments(fragments)
            }
        }
        Err(e) => {
            info!("JSON parse error: {} for data: {}", e, data);
            SseLine::Skip
        }
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, BoxError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                format!("Invalid API key format: {}", e)
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as BoxError)?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, BoxError> {
        if config.llm_type != LlmType::OpenAI {
            return Err("Invalid config type for OpenAIChatClient".into());
        }
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| "OpenAI API key is required".to_string())?;

        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, turns: &[Turn], stream: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: to_openai_messages(turns),
            temperature: 0.7,
            max_tokens: Some(2048),
            stream: if stream { Some(true) } else { None },
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, turns: &[Turn]) -> Result<CompletionResponse, BoxError> {
        let req = self.build_request(turns, false);

        let resp = self.http
            .post(self.endpoint())
            .json(&req)
            .send().await?
            .error_for_status()?
            .json::<OpenAIResponse>().await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| "No response from OpenAI API".to_string())?
            .message.content;

        Ok(CompletionResponse { response: content })
    }

    /// The request is sent and its status checked before returning, so a
    /// refused or unreachable provider surfaces as an `Err` here rather than
    /// as the first item of the stream.
    async fn stream_completion(&self, turns: &[Turn]) -> Result<FragmentStream, BoxError> {
        let req = self.build_request(turns, true);

        let resp = self.http
            .post(self.endpoint())
            .json(&req)
            .send().await?
            .error_for_status()?;

        Ok(
            create_streaming_response(move |tx| async move {
                let mut stream = resp.bytes_stream();
                let mut lines = LineBuffer::new();

                while let Some(chunk_result) = stream.next().await {
                    let chunk = match chunk_result {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let _ = tx.send(Err(Box::new(e) as _)).await;
                            return;
                        }
                    };
                    for line in lines.push(&chunk) {
                        debug!("OpenAI stream line: {}", line);
                        match parse_sse_line(&line) {
                            SseLine::Fragments(fragments) => {
                                for fragment in fragments {
                                    if tx.send(Ok(fragment)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            SseLine::Done => {
                                return;
                            }
                            SseLine::Skip => {}
                        }
                    }
                }

                if let Some(line) = lines.finish() {
                    if let SseLine::Fragments(fragments) = parse_sse_line(&line) {
                        for fragment in fragments {
                            let _ = tx.send(Ok(fragment)).await;
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
        self.model.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::OpenAI
    }
}
