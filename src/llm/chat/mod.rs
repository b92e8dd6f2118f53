pub mod openai;
pub mod bedrock;

use async_trait::async_trait;
use futures::{ stream, Future, Stream };
use serde::Deserialize;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::openai::OpenAIChatClient;
use self::bedrock::BedrockChatClient;
use crate::models::chat::Turn;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Incremental reply text, in the order the provider produced it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

/// One conversation in, one reply out. Providers that cannot stream
/// natively fall back to a single-fragment stream.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, turns: &[Turn]) -> Result<CompletionResponse, BoxError>;

    async fn stream_completion(&self, turns: &[Turn]) -> Result<FragmentStream, BoxError> {
        let completion = self.complete(turns).await?;
        Ok(single_fragment(completion.response))
    }

    fn get_model(&self) -> String;
    fn get_llm_type(&self) -> LlmType;
    fn supports_native_streaming(&self) -> bool {
        false
    }
}

pub fn single_fragment(text: String) -> FragmentStream {
    Box::pin(stream::once(async move { Ok(text) }))
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
    where
        F: FnOnce(mpsc::Sender<Result<String, BoxError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub async fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, BoxError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Bedrock => {
            let specific_client = BedrockChatClient::from_config(config).await?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Reassembles newline-delimited records from arbitrarily split network
/// chunks. Bytes are buffered until a full line is available, so a
/// multi-byte character straddling two chunks is never split.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the peer closed the stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim_end_matches('\r').to_string();
        self.pending.clear();
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct FixedClient;

    #[async_trait]
    impl ChatClient for FixedClient {
        async fn complete(&self, turns: &[Turn]) -> Result<CompletionResponse, BoxError> {
            Ok(CompletionResponse { response: format!("{} turns", turns.len()) })
        }

        fn get_model(&self) -> String {
            "fixed".to_string()
        }

        fn get_llm_type(&self) -> LlmType {
            LlmType::OpenAI
        }
    }

    #[tokio::test]
    async fn default_stream_yields_whole_completion_once() {
        let turns = vec![Turn::user("hi")];
        let fragments: Vec<String> = FixedClient
            .stream_completion(&turns).await
            .unwrap()
            .map(|f| f.unwrap())
            .collect().await;
        assert_eq!(fragments, vec!["1 turns".to_string()]);
    }

    #[tokio::test]
    async fn streaming_response_forwards_in_send_order() {
        let stream = create_streaming_response(|tx| async move {
            for piece in ["a", "b", "c"] {
                let _ = tx.send(Ok(piece.to_string())).await;
            }
        });
        let joined: String = stream.map(|f| f.unwrap()).collect::<Vec<_>>().await.concat();
        assert_eq!(joined, "abc");
    }

    #[test]
    fn line_buffer_joins_split_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\r\ndata: x\n\ndata"), vec![
            "data: {\"a\":1}".to_string(),
            "data: x".to_string(),
            String::new()
        ]);
        assert_eq!(buf.finish(), Some("data".to_string()));
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_whole() {
        let mut buf = LineBuffer::new();
        let bytes = "héllo\n".as_bytes();
        assert!(buf.push(&bytes[..2]).is_empty());
        assert_eq!(buf.push(&bytes[2..]), vec!["héllo".to_string()]);
    }
}
