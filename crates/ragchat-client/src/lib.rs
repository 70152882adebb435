//! Client SDK for the ragchat document question-answering service.
//!
//! The server answers questions over uploaded documents and streams each
//! answer back as server-sent events. This crate provides:
//!
//! - a typed client for the REST endpoints ([`RagClient`]), which refreshes
//!   the short-lived access token on 401 and retries once;
//! - a [`TokenStore`] that collapses concurrent refreshes into one;
//! - an incremental SSE decoder ([`sse::SseDecoder`]);
//! - [`QuerySession`], a state machine that turns a stream into chat history.
//!
//! # Example
//!
//! ```no_run
//! use ragchat_client::{QueryOptions, QuerySession, RagClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = RagClient::builder()
//!     .base_url("http://localhost:8000")
//!     .build()?;
//!
//! if !client.health().is_healthy().await {
//!     eprintln!("server is degraded");
//! }
//!
//! client.auth().login("me@example.com", "correct horse battery").await?;
//!
//! let session = QuerySession::new(client.clone());
//! session.send_query("What does the contract say about renewal?", QueryOptions::default()).await;
//!
//! let state = session.state();
//! match state.error {
//!     Some(error) => eprintln!("failed: {}", error),
//!     None => println!("{}", state.messages.last().map(|m| m.content.as_str()).unwrap_or("")),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Auth**: register, login, refresh, logout, current user
//! - **Chat**: streaming queries
//! - **Conversations**: list, create, get, rename, delete
//! - **Documents**: upload, list, get, delete
//! - **Health**: server and dependency health

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod sse;
pub mod stream;
pub mod types;

pub use auth::{AuthFailureHook, TokenRefresher, TokenStore};
pub use client::{ClientBuilder, RagClient, RequestOptions};
pub use error::{Error, Result};
pub use session::{QueryOptions, QuerySession, QuerySessionState, SessionAction, reduce};
pub use stream::{CollectingHandler, StreamHandler};
pub use types::*;
