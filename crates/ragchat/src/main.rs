//! ragchat - ask questions about your documents
//!
//! Main entry point for the ragchat CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ask, auth, chat, config, conversations, documents, health};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// ragchat - ask questions about your documents
#[derive(Parser)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Server URL (overrides the selected context)
    #[arg(long, global = true, env = "RAGCHAT_SERVER_URL")]
    pub server: Option<String>,

    /// Use a named context from client.yaml instead of the current one
    #[arg(long, global = true)]
    pub context: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check server health
    Health(health::HealthArgs),

    /// Create an account
    Register(auth::RegisterArgs),

    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Manage conversations
    Conversations(conversations::ConversationsArgs),

    /// Manage documents
    Documents(documents::DocumentsArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "ragchat=debug,ragchat_client=debug,ragchat_config=debug,info"
    } else {
        "ragchat=info,ragchat_client=warn,warn"
    };

    let file_appender = ragchat_config::log_dir().and_then(|dir| {
        tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("ragchat")
            .filename_suffix("log")
            .build(dir)
            .ok()
    });
    let (file_writer, _guard) = match file_appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(cli.verbose)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "ragchat=debug,ragchat_client=debug,ragchat_config=debug,info",
                ))
        }))
        .init();

    // Config commands run without resolving a context
    let connect = || {
        commands::Context::resolve(cli.server.clone(), cli.context.as_deref(), cli.json, cli.verbose)
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Health(args) => health::run(args, &connect()?).await,
        Commands::Register(args) => auth::register(args, &connect()?).await,
        Commands::Ask(args) => ask::run(args, &connect()?).await,
        Commands::Chat(args) => chat::run(args, &connect()?).await,
        Commands::Conversations(args) => conversations::run(args, &connect()?).await,
        Commands::Documents(args) => documents::run(args, &connect()?).await,
        Commands::Config(args) => config::run(args, cli.json).await,
    }
}
