use clap::{ Args as ClapArgs, Parser, Subcommand };

use crate::llm::{ parse_llm_type, LlmConfig };
use crate::relay::{ RelayConfig, ResponseMode };
use crate::widget::HistoryMode;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the chat relay HTTP server (POST /api/chat)
    Serve(ServeArgs),
    /// Chat with a running relay from the terminal
    Chat(ChatArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, bedrock)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "bedrock")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.openai.com/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (OpenAI). Bedrock uses the AWS credential chain.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o, anthropic.claude-instant-v1)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// AWS region for Bedrock. Falls back to the AWS environment chain, then us-east-1.
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// How replies are returned to the widget (buffered, streaming)
    #[arg(long, env = "RESPONSE_MODE", default_value = "buffered")]
    pub response_mode: String,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,
}

impl ServeArgs {
    pub fn relay_config(&self) -> Result<RelayConfig, String> {
        let llm_type = parse_llm_type(&self.chat_llm_type)?;
        let api_key = if !self.chat_api_key.is_empty() {
            Some(self.chat_api_key.clone())
        } else {
            None
        };
        Ok(RelayConfig {
            llm: LlmConfig {
                llm_type,
                api_key,
                completion_model: self.chat_model.clone(),
                base_url: self.chat_base_url.clone(),
                region: self.aws_region.clone(),
            },
            response_mode: self.response_mode.parse()?,
        })
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    /// Relay endpoint to post conversations to.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:3000/api/chat")]
    pub relay_url: String,

    /// Response mode the relay was started with (buffered, streaming)
    #[arg(long, env = "RESPONSE_MODE", default_value = "buffered")]
    pub response_mode: String,

    /// Which turns to send per request (full, latest)
    #[arg(long, env = "HISTORY_MODE", default_value = "full")]
    pub history_mode: String,
}

impl ChatArgs {
    pub fn response_mode(&self) -> Result<ResponseMode, String> {
        self.response_mode.parse()
    }

    pub fn history_mode(&self) -> Result<HistoryMode, String> {
        self.history_mode.parse()
    }
}
