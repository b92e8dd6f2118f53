use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info };
use reqwest::Client as HttpClient;

use crate::llm::chat::{ create_streaming_response, BoxError };
use crate::models::chat::{ ChatReply, Turn };
use crate::relay::{ RelayReply, ResponseMode };

/// How the widget reaches the relay endpoint.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn send(&self, turns: &[Turn], mode: ResponseMode) -> Result<RelayReply, BoxError>;
}

pub struct HttpRelayClient {
    http: HttpClient,
    url: String,
}

impl HttpRelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn send(&self, turns: &[Turn], mode: ResponseMode) -> Result<RelayReply, BoxError> {
        debug!("Posting {} turns to {}", turns.len(), self.url);
        let resp = self.http.post(&self.url).json(turns).send().await?.error_for_status()?;

        match mode {
            ResponseMode::Buffered => {
                let reply = resp.json::<ChatReply>().await?;
                Ok(RelayReply::Text(reply.text))
            }
            ResponseMode::Streaming => {
                let mut body = resp.bytes_stream();
                Ok(
                    RelayReply::Fragments(
                        create_streaming_response(move |tx| async move {
                            let mut decoder = Utf8Decoder::default();
                            while let Some(chunk) = body.next().await {
                                match chunk {
                                    Ok(bytes) => {
                                        let text = decoder.push(&bytes);
                                        if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                            return;
                                        }
                                    }
                                    Err(e) => {
                                        info!("Relay stream ended abruptly: {}", e);
                                        let _ = tx.send(Err(Box::new(e) as _)).await;
                                        return;
                                    }
                                }
                            }
                            if let Some(rest) = decoder.finish() {
                                let _ = tx.send(Ok(rest)).await;
                            }
                        })
                    )
                )
            }
        }
    }
}

/// Decodes UTF-8 across chunk boundaries, holding back an incomplete
/// trailing sequence until the next chunk arrives.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let bytes: Vec<u8> = self.pending.drain(..complete).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(rest)
    }
}
