//! API endpoint implementations.

mod auth;
mod chat;
mod conversations;
mod documents;
mod health;

pub use auth::AuthApi;
pub use chat::ChatApi;
pub use conversations::ConversationsApi;
pub use documents::DocumentsApi;
pub use health::HealthApi;
