pub mod cli;
pub mod error;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;
pub mod widget;

use cli::{ Args, Command, ServeArgs };
use log::info;
use relay::ChatRelay;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    match args.command {
        Command::Serve(serve) => serve_relay(serve).await,
        Command::Chat(chat) => widget::terminal::run_terminal(&chat).await,
    }
}

async fn serve_relay(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("AWS Region: {}", args.aws_region.as_deref().unwrap_or("environment default"));
    info!("Response Mode: {}", args.response_mode);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let config = args.relay_config()?;
    let relay = ChatRelay::from_config(&config).await?;
    let server = Server::new(args.server_addr.clone(), relay, args);
    server.run().await?;

    Ok(())
}
