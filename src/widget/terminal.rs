use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use log::info;
use tokio::io::{ AsyncBufReadExt, BufReader };

use super::transport::HttpRelayClient;
use super::{ ChatWidget, WidgetEvent, WidgetObserver, GREETING };
use crate::cli::ChatArgs;
use crate::models::chat::Role;

/// Prints the conversation as it changes. User turns are already on
/// screen because the user typed them.
struct TerminalObserver;

impl WidgetObserver for TerminalObserver {
    fn on_event(&self, event: &WidgetEvent) {
        let mut out = std::io::stdout().lock();
        let _ = match event {
            WidgetEvent::TurnAdded(turn) if turn.role == Role::Assistant => {
                if turn.content.is_empty() {
                    write!(out, "Assistant: ")
                } else {
                    writeln!(out, "Assistant: {}", turn.content)
                }
            }
            WidgetEvent::TurnAdded(_) => Ok(()),
            WidgetEvent::FragmentAppended(fragment) => write!(out, "{}", fragment),
            WidgetEvent::LastTurnReplaced(turn) => writeln!(out, "\nAssistant: {}", turn.content),
            WidgetEvent::BusyChanged(true) => Ok(()),
            WidgetEvent::BusyChanged(false) => writeln!(out),
        };
        let _ = out.flush();
    }
}

/// Terminals show replies verbatim instead of as HTML.
fn plain_text(text: &str) -> String {
    text.to_string()
}

/// Reads one message per line from stdin until EOF or `/quit`.
pub async fn run_terminal(args: &ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mode = args.response_mode()?;
    let history = args.history_mode()?;
    info!("Chatting with relay at {} (mode={}, history={:?})", args.relay_url, mode, history);

    let widget = ChatWidget::new(Arc::new(HttpRelayClient::new(args.relay_url.clone())), mode)
        .with_history(history)
        .with_formatter(plain_text)
        .with_observer(Arc::new(TerminalObserver));

    println!("Assistant: {}\n", GREETING);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim() == "/quit" {
            break;
        }
        widget.submit(&line).await;
    }

    Ok(())
}
