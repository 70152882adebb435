//! Request and response types for the ragchat API.
//!
//! These types mirror the server's API contract.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum question length accepted by the query endpoint (characters).
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Accepted range for `top_k`.
pub const TOP_K_RANGE: std::ops::RangeInclusive<u32> = 1..=20;

// ─────────────────────────────────────────────────────────────────────────────
// Streaming query
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the streaming query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer from the user's documents.
    pub question: String,
    /// Number of chunks to retrieve (server default when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Conversation to append this turn to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl QueryRequest {
    /// Create a request with just a question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            top_k: None,
            conversation_id: None,
        }
    }

    /// Set the retrieval depth.
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Continue an existing conversation.
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Check the request against the server's input limits.
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(Error::Validation("question must not be empty".to_string()));
        }
        let len = self.question.chars().count();
        if len > MAX_QUESTION_CHARS {
            return Err(Error::Validation(format!(
                "question is {} characters, maximum is {}",
                len, MAX_QUESTION_CHARS
            )));
        }
        if let Some(k) = self.top_k
            && !TOP_K_RANGE.contains(&k)
        {
            return Err(Error::Validation(format!(
                "top_k must be between {} and {}, got {}",
                TOP_K_RANGE.start(),
                TOP_K_RANGE.end(),
                k
            )));
        }
        Ok(())
    }

    /// Serialize to a JSON request body.
    pub fn to_body(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A retrieved document chunk that grounded the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Owning document ID.
    pub document_id: String,
    /// Original filename of the document.
    pub filename: String,
    /// Position of the chunk within the document.
    pub chunk_index: i64,
    /// Chunk text.
    pub content: String,
    /// Similarity score (higher is closer).
    pub score: f64,
}

/// Token accounting for one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Payload of the terminal `done` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    /// The complete answer text (absent when nothing was retrieved).
    #[serde(default)]
    pub full_text: String,
}

/// Payload of the terminal `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub detail: String,
}

/// An event decoded from the query stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Conversation the turn was stored under.
    ConversationId(String),
    /// Retrieved sources for the answer.
    Sources(Vec<Source>),
    /// Fragment of answer text.
    Delta(String),
    /// Token usage for the answer.
    Usage(Usage),
    /// Stream completed.
    Done(DonePayload),
    /// Server-side failure while answering.
    Error(ErrorPayload),
}

impl StreamEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::ConversationId(_) => "conversation_id",
            StreamEvent::Sources(_) => "sources",
            StreamEvent::Delta(_) => "delta",
            StreamEvent::Usage(_) => "usage",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat history
// ─────────────────────────────────────────────────────────────────────────────

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A message in a query session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(id: impl Into<String>, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            sources: None,
            usage: None,
            timestamp,
        }
    }

    /// Create an assistant message.
    pub fn assistant(
        id: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            sources: None,
            usage: None,
            timestamp,
        }
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Login credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Access token response from login and refresh.
///
/// The refresh credential travels separately as an HttpOnly cookie.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access", &"<redacted>")
            .finish()
    }
}

/// Account details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
}

/// Logout confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pagination
// ─────────────────────────────────────────────────────────────────────────────

/// Query parameters for paginated listings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PageQuery {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversations
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: String,
}

/// Request to rename a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConversationRequest {
    pub title: String,
}

/// Conversation summary for list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A message as stored by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    /// Sources as stored; normally a list of [`Source`] objects.
    #[serde(default)]
    pub sources: Option<serde_json::Value>,
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    pub created_at: String,
}

impl From<StoredMessage> for ChatMessage {
    fn from(stored: StoredMessage) -> Self {
        let role = if stored.role == "user" {
            Role::User
        } else {
            Role::Assistant
        };
        let sources = stored
            .sources
            .and_then(|v| serde_json::from_value::<Vec<Source>>(v).ok());
        let usage = match (stored.prompt_tokens, stored.completion_tokens) {
            (Some(prompt), Some(completion)) => Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        };
        ChatMessage {
            id: stored.id,
            role,
            content: stored.content,
            sources,
            usage,
            timestamp: parse_timestamp(&stored.created_at),
        }
    }
}

/// Full conversation with its messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: String,
    pub title: String,
    pub messages: Vec<StoredMessage>,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationDetail {
    /// Convert stored messages into session history.
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().map(ChatMessage::from).collect()
    }
}

/// Parse a server timestamp; timezone-less values are taken as UTC.
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return ts.with_timezone(&Utc);
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

/// A file to upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content: Vec<u8>,
    /// MIME type; guessed by the server from the filename when absent.
    pub mime_type: Option<String>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Result for one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub chunk_count: u64,
}

/// Document list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub chunk_count: u64,
    pub created_at: String,
}

/// Document with its extracted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetail {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub content: String,
    pub chunk_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy".
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub redis: Option<String>,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
