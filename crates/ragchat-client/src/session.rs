//! Query session state machine.
//!
//! A session is `Idle` or `Streaming`. Every transition is expressed as a
//! [`SessionAction`] applied by the pure [`reduce`] function, so the state
//! machine can be driven and tested without a network. [`QuerySession`]
//! wraps the reducer with shared state, the streaming client and
//! cancellation.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::RagClient;
use crate::stream::StreamHandler;
use crate::types::{ChatMessage, QueryRequest, Source, StreamEvent, Usage};

/// Snapshot of a query session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySessionState {
    /// History, oldest first. Messages are never edited once appended.
    pub messages: Vec<ChatMessage>,
    pub is_streaming: bool,
    /// Answer text received so far; meaningful only while streaming.
    pub streaming_content: String,
    /// Sources staged for the answer being streamed.
    pub streaming_sources: Vec<Source>,
    /// Usage staged for the answer being streamed.
    pub streaming_usage: Option<Usage>,
    pub error: Option<String>,
    /// Set when the last failure was a 429.
    pub is_rate_limited: bool,
    pub conversation_id: Option<String>,
}

impl QuerySessionState {
    /// Content of the most recent user message, for retrying.
    pub fn last_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_user())
            .map(|m| m.content.as_str())
    }

    fn clear_streaming(&mut self) {
        self.is_streaming = false;
        self.streaming_content.clear();
        self.streaming_sources.clear();
        self.streaming_usage = None;
    }

    /// Move the streaming buffer into an assistant message.
    ///
    /// With `skip_empty` an empty answer adds no message.
    fn flush_answer(&mut self, stamp: MessageStamp, fallback: Option<String>, skip_empty: bool) {
        let content = if self.streaming_content.is_empty() {
            fallback.unwrap_or_default()
        } else {
            std::mem::take(&mut self.streaming_content)
        };
        if !(skip_empty && content.is_empty()) {
            let mut message = ChatMessage::assistant(stamp.id, content, stamp.timestamp)
                .with_sources(std::mem::take(&mut self.streaming_sources));
            if let Some(usage) = self.streaming_usage.take() {
                message = message.with_usage(usage);
            }
            self.messages.push(message);
        }
        self.clear_streaming();
    }
}

/// Identity and time for a message created by a transition.
///
/// Generated outside the reducer so that [`reduce`] stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStamp {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageStamp {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
        }
    }

    /// A fresh random ID stamped with the current time.
    pub fn now() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), Utc::now())
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// A question was sent; `message` is the user's turn.
    Submit { message: ChatMessage },
    /// The server named the conversation this turn belongs to.
    ConversationBound(String),
    Sources(Vec<Source>),
    Delta(String),
    Usage(Usage),
    /// The answer completed; `full_text` is used only if no delta arrived.
    Done {
        stamp: MessageStamp,
        full_text: Option<String>,
    },
    /// The stream failed, from an `error` event or a transport failure.
    Failed {
        message: String,
        status: Option<u16>,
    },
    /// The user cancelled the stream.
    Cancelled { stamp: MessageStamp },
    /// The stream ended without a terminal event.
    StreamClosed { stamp: MessageStamp },
    /// Replace the history wholesale.
    LoadHistory(Vec<ChatMessage>),
    /// Start over with an empty session.
    Reset,
    /// A question was rejected before sending.
    ValidationFailed(String),
}

/// Apply one action to a session state.
pub fn reduce(mut state: QuerySessionState, action: SessionAction) -> QuerySessionState {
    match action {
        SessionAction::Submit { message } => {
            if state.is_streaming {
                return state;
            }
            state.messages.push(message);
            state.clear_streaming();
            state.is_streaming = true;
            state.error = None;
            state.is_rate_limited = false;
        }
        SessionAction::ConversationBound(id) => {
            if state.conversation_id.is_none() {
                state.conversation_id = Some(id);
            }
        }
        SessionAction::Sources(sources) if state.is_streaming => {
            state.streaming_sources = sources;
        }
        SessionAction::Delta(text) if state.is_streaming => {
            state.streaming_content.push_str(&text);
        }
        SessionAction::Usage(usage) if state.is_streaming => {
            state.streaming_usage = Some(usage);
        }
        SessionAction::Done { stamp, full_text } if state.is_streaming => {
            state.flush_answer(stamp, full_text, false);
        }
        SessionAction::Failed { message, status } if state.is_streaming => {
            state.clear_streaming();
            state.error = Some(message);
            state.is_rate_limited = status == Some(429);
        }
        SessionAction::Cancelled { stamp } | SessionAction::StreamClosed { stamp }
            if state.is_streaming =>
        {
            state.flush_answer(stamp, None, true);
        }
        SessionAction::LoadHistory(messages) => {
            state.messages = messages;
        }
        SessionAction::Reset => {
            state.messages.clear();
            state.conversation_id = None;
            state.error = None;
            state.is_rate_limited = false;
        }
        SessionAction::ValidationFailed(message) if !state.is_streaming => {
            state.error = Some(message);
            state.is_rate_limited = false;
        }
        // Stream events while idle belong to a finished stream
        _ => {}
    }
    state
}

/// Per-query options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Number of chunks to retrieve (server default when `None`).
    pub top_k: Option<u32>,
}

impl QueryOptions {
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// Called with the conversation ID when a session is first bound to one.
pub type ConversationCreatedHook = Arc<dyn Fn(&str) + Send + Sync>;

/// An interactive query session over one conversation.
///
/// Cheap to clone; clones share state, so one task can run
/// [`send_query`](Self::send_query) while another calls
/// [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct QuerySession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    client: RagClient,
    shared: Mutex<Shared>,
    on_conversation_created: Option<ConversationCreatedHook>,
}

#[derive(Default)]
struct Shared {
    state: QuerySessionState,
    /// Cancellation for the active stream.
    cancel: Option<CancellationToken>,
    /// Incremented per stream; events from older streams are dropped.
    generation: u64,
}

impl Shared {
    fn apply(&mut self, action: SessionAction) {
        let state = std::mem::take(&mut self.state);
        self.state = reduce(state, action);
    }
}

impl QuerySession {
    /// Create an empty session.
    pub fn new(client: RagClient) -> Self {
        Self::build(client, None)
    }

    /// Create an empty session that reports newly bound conversations.
    pub fn with_conversation_created(
        client: RagClient,
        hook: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self::build(client, Some(Arc::new(hook)))
    }

    fn build(client: RagClient, on_conversation_created: Option<ConversationCreatedHook>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                client,
                shared: Mutex::new(Shared::default()),
                on_conversation_created,
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> QuerySessionState {
        self.inner.shared.lock().state.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.shared.lock().state.is_streaming
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.inner.shared.lock().state.conversation_id.clone()
    }

    /// Ask a question and stream the answer into the session.
    ///
    /// Does nothing while another question is streaming. Resolves once the
    /// stream has ended; the outcome is in [`state`](Self::state).
    pub async fn send_query(&self, question: &str, options: QueryOptions) {
        let (request, cancel, generation) = {
            let mut shared = self.inner.shared.lock();
            if shared.state.is_streaming {
                tracing::debug!("Query ignored: already streaming");
                return;
            }

            let mut request = QueryRequest::new(question);
            request.top_k = options.top_k;
            request.conversation_id = shared.state.conversation_id.clone();
            if let Err(e) = request.validate() {
                shared.apply(SessionAction::ValidationFailed(e.to_string()));
                return;
            }

            let stamp = MessageStamp::now();
            shared.apply(SessionAction::Submit {
                message: ChatMessage::user(stamp.id, question, stamp.timestamp),
            });

            let cancel = CancellationToken::new();
            shared.cancel = Some(cancel.clone());
            shared.generation += 1;
            (request, cancel, shared.generation)
        };

        tracing::debug!(
            conversation_id = ?request.conversation_id,
            top_k = ?request.top_k,
            "Sending query"
        );

        let mut handler = SessionHandler {
            session: self.inner.clone(),
            cancel: cancel.clone(),
            generation,
        };
        self.inner
            .client
            .chat()
            .query(&request, &mut handler, &cancel)
            .await;
    }

    /// Stop the active stream, keeping any partial answer as a message.
    pub fn cancel(&self) {
        let mut shared = self.inner.shared.lock();
        if let Some(cancel) = shared.cancel.take() {
            cancel.cancel();
        }
        if shared.state.is_streaming {
            tracing::info!(
                partial_chars = shared.state.streaming_content.len(),
                "Query cancelled"
            );
        }
        shared.apply(SessionAction::Cancelled {
            stamp: MessageStamp::now(),
        });
    }

    /// Replace the history, e.g. with a stored conversation.
    pub fn load_history(&self, messages: Vec<ChatMessage>) {
        self.inner
            .shared
            .lock()
            .apply(SessionAction::LoadHistory(messages));
    }

    /// Clear history, conversation binding and errors.
    ///
    /// An active stream keeps running; cancel it first.
    pub fn reset(&self) {
        self.inner.shared.lock().apply(SessionAction::Reset);
    }

    /// Continue a stored conversation: reset, bind and load its history.
    pub fn resume(&self, conversation_id: impl Into<String>, messages: Vec<ChatMessage>) {
        let mut shared = self.inner.shared.lock();
        shared.apply(SessionAction::Reset);
        shared.apply(SessionAction::ConversationBound(conversation_id.into()));
        shared.apply(SessionAction::LoadHistory(messages));
    }
}

impl fmt::Debug for QuerySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySession")
            .field("state", &self.inner.shared.lock().state)
            .finish()
    }
}

/// Feeds one stream's events into the session.
struct SessionHandler {
    session: Arc<SessionInner>,
    cancel: CancellationToken,
    generation: u64,
}

impl SessionHandler {
    /// Apply an action if this stream is still the live one.
    fn apply(&self, action: SessionAction) {
        let mut shared = self.session.shared.lock();
        if self.cancel.is_cancelled() || shared.generation != self.generation {
            return;
        }
        shared.apply(action);
        if !shared.state.is_streaming {
            shared.cancel = None;
        }
    }

    fn bind_conversation(&self, id: String) {
        let bound = {
            let mut shared = self.session.shared.lock();
            if self.cancel.is_cancelled() || shared.generation != self.generation {
                return;
            }
            match shared.state.conversation_id.clone() {
                None => {
                    shared.apply(SessionAction::ConversationBound(id.clone()));
                    true
                }
                Some(current) if current != id => {
                    tracing::warn!(%current, received = %id, "Ignoring conversation rebind");
                    false
                }
                Some(_) => false,
            }
        };
        if bound {
            tracing::debug!(conversation_id = %id, "Conversation bound");
            if let Some(hook) = &self.session.on_conversation_created {
                hook(&id);
            }
        }
    }
}

impl StreamHandler for SessionHandler {
    fn on_event(&mut self, event: StreamEvent) {
        let action = match event {
            StreamEvent::ConversationId(id) => {
                self.bind_conversation(id);
                return;
            }
            StreamEvent::Sources(sources) => SessionAction::Sources(sources),
            StreamEvent::Delta(text) => SessionAction::Delta(text),
            StreamEvent::Usage(usage) => SessionAction::Usage(usage),
            StreamEvent::Done(done) => SessionAction::Done {
                stamp: MessageStamp::now(),
                full_text: Some(done.full_text),
            },
            StreamEvent::Error(error) => {
                tracing::warn!(detail = %error.detail, "Query failed on server");
                // The error event payload carries no HTTP status
                SessionAction::Failed {
                    message: error.detail,
                    status: None,
                }
            }
        };
        self.apply(action);
    }

    fn on_error(&mut self, message: String, status: Option<u16>) {
        tracing::warn!(%message, ?status, "Query stream error");
        self.apply(SessionAction::Failed { message, status });
    }

    fn on_parse_error(&mut self, message: String) {
        tracing::warn!(%message, "Skipping undecodable stream event");
    }

    fn on_done(&mut self) {
        self.apply(SessionAction::StreamClosed {
            stamp: MessageStamp::now(),
        });
    }
}
