//! CLI command handlers.

pub mod ask;
pub mod auth;
pub mod chat;
pub mod config;
pub mod conversations;
pub mod documents;
pub mod health;

use anyhow::{Context as _, Result};
use console::Style;
use ragchat_client::{RagClient, Source};
use ragchat_config::ResolvedContext;
use serde::Serialize;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Server URL to connect to.
    pub server_url: String,
    /// Settings from the selected config context.
    pub settings: ResolvedContext,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Resolve connection settings from client.yaml and global flags.
    ///
    /// The server is taken from `--server` / `RAGCHAT_SERVER_URL`, then the
    /// selected context, then the built-in default.
    pub fn resolve(
        server: Option<String>,
        context: Option<&str>,
        json_output: bool,
        verbose: bool,
    ) -> Result<Self> {
        let settings = ragchat_config::load_client_config()?.resolve(context)?;
        let server_url = server.unwrap_or_else(|| settings.server.clone());
        tracing::debug!(server = %server_url, context = ?settings.name, "Resolved connection settings");
        Ok(Self {
            server_url,
            settings,
            json_output,
            verbose,
        })
    }

    /// Build an API client for the resolved server.
    pub fn client(&self) -> Result<RagClient> {
        RagClient::builder()
            .base_url(&self.server_url)
            .timeout(self.settings.timeout())
            .stream_timeout(self.settings.stream_timeout())
            .user_agent(format!("ragchat-cli/{}", env!("CARGO_PKG_VERSION")))
            .on_auth_failure(|| tracing::warn!("Session expired; log in again"))
            .build()
            .with_context(|| format!("Invalid server URL: {}", self.server_url))
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a list of retrieved sources.
pub fn print_sources(sources: &[Source]) {
    let dim = Style::new().dim();
    for (i, source) in sources.iter().enumerate() {
        println!(
            "  [{}] {} {}",
            i + 1,
            source.filename,
            dim.apply_to(format!(
                "(chunk {}, score {:.3})",
                source.chunk_index, source.score
            ))
        );
    }
}

pub fn print_error(msg: &str) {
    let red = Style::new().red();
    eprintln!("{} {}", red.apply_to("Error:"), msg);
}

pub fn print_dim(msg: &str) {
    let dim = Style::new().dim();
    println!("{}", dim.apply_to(msg));
}
