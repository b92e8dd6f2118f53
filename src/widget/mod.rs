pub mod format;
pub mod terminal;
pub mod transport;

use futures::StreamExt;
use log::{ info, warn };
use std::str::FromStr;
use std::sync::{ Arc, Mutex, MutexGuard };

use crate::error::AppendError;
use crate::llm::chat::FragmentStream;
use crate::models::chat::{ Conversation, Turn };
use crate::relay::{ RelayReply, ResponseMode };
use self::format::format_message;
use self::transport::RelayTransport;

pub const GREETING: &str = "Hi! I'm the Headstarter support assistant. How can I help you today?";
pub const FALLBACK_REPLY: &str = "I'm sorry, but I encountered an error. Please try again later.";

/// Which turns go out with each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    /// The whole conversation, minus the leading greeting.
    Full,
    /// Only the turn just submitted.
    Latest,
}

impl FromStr for HistoryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(HistoryMode::Full),
            "latest" => Ok(HistoryMode::Latest),
            _ => Err(format!("Unsupported history mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input or a request already in flight; nothing happened.
    Ignored,
    Replied,
    /// The fallback apology was shown instead of a reply.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetEvent {
    TurnAdded(Turn),
    FragmentAppended(String),
    LastTurnReplaced(Turn),
    BusyChanged(bool),
}

pub trait WidgetObserver: Send + Sync {
    fn on_event(&self, event: &WidgetEvent);
}

pub struct NoopObserver;

impl WidgetObserver for NoopObserver {
    fn on_event(&self, _event: &WidgetEvent) {}
}

/// `conversation` holds the model's raw text and is what gets sent back
/// upstream. `transcript` mirrors it turn for turn with replies formatted
/// for display.
#[derive(Debug)]
struct WidgetState {
    conversation: Conversation,
    transcript: Conversation,
    input: String,
    busy: bool,
}

/// Client-side chat state: the conversation so far, the pending input and
/// the single in-flight request guard. Clones share the same state.
#[derive(Clone)]
pub struct ChatWidget {
    state: Arc<Mutex<WidgetState>>,
    transport: Arc<dyn RelayTransport>,
    observer: Arc<dyn WidgetObserver>,
    mode: ResponseMode,
    history: HistoryMode,
    formatter: fn(&str) -> String,
}

impl ChatWidget {
    pub fn new(transport: Arc<dyn RelayTransport>, mode: ResponseMode) -> Self {
        Self {
            state: Arc::new(
                Mutex::new(WidgetState {
                    conversation: Conversation::with_greeting(GREETING),
                    transcript: Conversation::with_greeting(GREETING),
                    input: String::new(),
                    busy: false,
                })
            ),
            transport,
            observer: Arc::new(NoopObserver),
            mode,
            history: HistoryMode::Full,
            formatter: format_message,
        }
    }

    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn WidgetObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replaces the buffered-reply formatter (HTML by default).
    pub fn with_formatter(mut self, formatter: fn(&str) -> String) -> Self {
        self.formatter = formatter;
        self
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The dialogue as the model saw it.
    pub fn conversation(&self) -> Conversation {
        self.lock().conversation.clone()
    }

    /// The dialogue as displayed, with buffered replies formatted.
    pub fn transcript(&self) -> Conversation {
        self.lock().transcript.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    pub fn input(&self) -> String {
        self.lock().input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.lock().input = text.into();
    }

    /// Submits whatever is in the input field.
    pub async fn submit_input(&self) -> SubmitOutcome {
        let text = self.input();
        self.submit(&text).await
    }

    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let request = {
            let mut state = self.lock();
            if text.trim().is_empty() || state.busy {
                return SubmitOutcome::Ignored;
            }
            state.busy = true;
            state.input.clear();
            match self.history {
                HistoryMode::Full => {
                    let mut turns = state.conversation.request_history();
                    turns.push(Turn::user(text));
                    turns
                }
                HistoryMode::Latest => vec![Turn::user(text)],
            }
        };
        self.push_turn(Turn::user(text), Turn::user(text));
        self.observer.on_event(&WidgetEvent::BusyChanged(true));

        let outcome = match self.transport.send(&request, self.mode).await {
            Ok(RelayReply::Text(text)) => {
                let display = (self.formatter)(&text);
                self.push_turn(Turn::assistant(text), Turn::assistant(display));
                SubmitOutcome::Replied
            }
            Ok(RelayReply::Fragments(stream)) => self.drain(stream).await,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                self.push_turn(Turn::assistant(FALLBACK_REPLY), Turn::assistant(FALLBACK_REPLY));
                SubmitOutcome::Failed
            }
        };

        self.lock().busy = false;
        self.observer.on_event(&WidgetEvent::BusyChanged(false));
        outcome
    }

    fn push_turn(&self, raw: Turn, display: Turn) {
        {
            let mut state = self.lock();
            state.conversation.push(raw);
            state.transcript.push(display.clone());
        }
        self.observer.on_event(&WidgetEvent::TurnAdded(display));
    }

    fn append_fragment(&self, fragment: &str) -> Result<(), AppendError> {
        let mut state = self.lock();
        state.conversation.push_fragment(fragment)?;
        state.transcript.push_fragment(fragment)
    }

    fn replace_with_fallback(&self) {
        {
            let mut state = self.lock();
            let replaced = state.conversation
                .replace_last(FALLBACK_REPLY)
                .and_then(|_| state.transcript.replace_last(FALLBACK_REPLY));
            if let Err(e) = replaced {
                warn!("Could not replace partial reply: {}", e);
            }
        }
        self.observer.on_event(&WidgetEvent::LastTurnReplaced(Turn::assistant(FALLBACK_REPLY)));
    }

    /// Grows an initially empty assistant turn fragment by fragment. A
    /// broken or empty stream turns that same turn into the fallback reply.
    async fn drain(&self, mut stream: FragmentStream) -> SubmitOutcome {
        self.push_turn(Turn::assistant(""), Turn::assistant(""));
        let mut received = false;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if let Err(e) = self.append_fragment(&fragment) {
                        warn!("Dropping fragment: {}", e);
                        continue;
                    }
                    received |= !fragment.is_empty();
                    self.observer.on_event(&WidgetEvent::FragmentAppended(fragment));
                }
                Err(e) => {
                    warn!("Reply stream failed: {}", e);
                    self.replace_with_fallback();
                    return SubmitOutcome::Failed;
                }
            }
        }

        if !received {
            warn!("Reply stream ended without any text");
            self.replace_with_fallback();
            return SubmitOutcome::Failed;
        }

        info!("Reply stream complete");
        SubmitOutcome::Replied
    }
}
