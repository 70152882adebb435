//! Config command - manage server contexts in client.yaml.

use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};
use serde::Serialize;

use ragchat_config::{self, ClientConfig, Context as ClientContext};

use super::print_json;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show all contexts and the resolved settings
    Show,

    /// Show configuration file path
    Path,

    /// Show the current context name
    CurrentContext,

    /// Switch to a different context
    UseContext {
        /// Context name to switch to
        name: String,
    },

    /// Create or update a context
    SetContext {
        /// Context name
        name: String,

        /// Server URL (e.g., http://localhost:8000)
        #[arg(long)]
        server: Option<String>,

        /// Document chunks to retrieve per question (1-20)
        #[arg(long)]
        top_k: Option<u32>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Streaming answer timeout in seconds
        #[arg(long)]
        stream_timeout: Option<u64>,
    },

    /// Delete a context
    DeleteContext {
        /// Context name to delete
        name: String,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, json: bool) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(json),
        ConfigCommand::Path => cmd_path(),
        ConfigCommand::CurrentContext => cmd_current_context(),
        ConfigCommand::UseContext { name } => cmd_use_context(&name),
        ConfigCommand::SetContext {
            name,
            server,
            top_k,
            timeout,
            stream_timeout,
        } => cmd_set_context(
            &name,
            ContextUpdate {
                server,
                top_k,
                timeout,
                stream_timeout,
            },
        ),
        ConfigCommand::DeleteContext { name } => cmd_delete_context(&name),
    }
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    path: Option<String>,
    current_context: Option<&'a str>,
    contexts: &'a [ClientContext],
    resolved: ResolvedOutput,
}

#[derive(Serialize)]
struct ResolvedOutput {
    server: String,
    timeout: u64,
    stream_timeout: u64,
    top_k: Option<u32>,
}

fn cmd_show(json: bool) -> Result<()> {
    let config = ragchat_config::load_client_config()?;
    let resolved = config.resolve(None)?;
    let path = ragchat_config::client_config_path().map(|p| p.display().to_string());

    if json {
        return print_json(&ShowOutput {
            path,
            current_context: config.current_context.as_deref(),
            contexts: &config.contexts,
            resolved: ResolvedOutput {
                server: resolved.server,
                timeout: resolved.timeout,
                stream_timeout: resolved.stream_timeout,
                top_k: resolved.top_k,
            },
        });
    }

    if let Some(path) = path {
        println!("Config file: {}", path);
        println!();
    }

    if config.contexts.is_empty() {
        println!("No contexts configured.");
        println!();
        println!("Create one with:");
        println!("  ragchat config set-context local --server=http://localhost:8000");
        println!();
    } else {
        let current = config.current_context.as_deref();
        println!("CURRENT   NAME            SERVER");
        for ctx in &config.contexts {
            let marker = if current == Some(ctx.name.as_str()) {
                "*"
            } else {
                " "
            };
            println!("{}         {:<15} {}", marker, ctx.name, ctx.server);
        }
        println!();
    }

    println!("Resolved settings:");
    println!("  server:         {}", resolved.server);
    println!("  timeout:        {}s", resolved.timeout);
    println!("  stream-timeout: {}s", resolved.stream_timeout);
    match resolved.top_k {
        Some(k) => println!("  top-k:          {}", k),
        None => println!("  top-k:          (server default)"),
    }

    Ok(())
}

fn cmd_path() -> Result<()> {
    let path = ragchat_config::client_config_path()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    println!("{}", path.display());
    Ok(())
}

fn cmd_current_context() -> Result<()> {
    let config = ragchat_config::load_client_config()?;

    match &config.current_context {
        Some(name) => println!("{}", name),
        None => {
            println!("No current context set. Use 'ragchat config use-context <name>' to set one.")
        }
    }

    Ok(())
}

fn cmd_use_context(name: &str) -> Result<()> {
    let mut config = ragchat_config::load_client_config()?;

    config.use_context(name)?;
    ragchat_config::save_client_config(&config)?;

    println!("Switched to context \"{}\".", name);
    Ok(())
}

/// Fields given on the command line for `set-context`.
#[derive(Debug, Default)]
struct ContextUpdate {
    server: Option<String>,
    top_k: Option<u32>,
    timeout: Option<u64>,
    stream_timeout: Option<u64>,
}

fn cmd_set_context(name: &str, update: ContextUpdate) -> Result<()> {
    let mut config = ragchat_config::load_client_config()?;
    let created = apply_context_update(&mut config, name, update)?;

    // Validate before writing so a bad value never lands on disk
    config.resolve(Some(name))?;
    ragchat_config::save_client_config(&config)?;

    if created {
        println!("Context \"{}\" created.", name);
    } else {
        println!("Context \"{}\" modified.", name);
    }
    if config.current_context.as_deref() == Some(name) && created {
        println!("Context \"{}\" set as current context.", name);
    }

    Ok(())
}

/// Create or update a context in place, returning whether it was created.
///
/// The first context ever created becomes the current one.
fn apply_context_update(config: &mut ClientConfig, name: &str, update: ContextUpdate) -> Result<bool> {
    let (mut ctx, created) = match config.get_context(name) {
        Some(existing) => (existing.clone(), false),
        None => {
            let server = update
                .server
                .clone()
                .ok_or_else(|| anyhow!("--server is required when creating a new context"))?;
            (ClientContext::new(name, server), true)
        }
    };

    if let Some(url) = update.server {
        ctx.server = url;
    }
    if let Some(k) = update.top_k {
        ctx.top_k = Some(k);
    }
    if let Some(t) = update.timeout {
        ctx.timeout = Some(t);
    }
    if let Some(t) = update.stream_timeout {
        ctx.stream_timeout = Some(t);
    }
    config.set_context(ctx);

    if config.current_context.is_none() && config.contexts.len() == 1 {
        config.current_context = Some(name.to_string());
    }
    Ok(created)
}

fn cmd_delete_context(name: &str) -> Result<()> {
    let mut config = ragchat_config::load_client_config()?;

    match config.remove_context(name) {
        Some(_) => {
            ragchat_config::save_client_config(&config)?;
            println!("Context \"{}\" deleted.", name);
            if config.current_context.is_none() {
                println!(
                    "Note: No current context. Use 'ragchat config use-context <name>' to set one."
                );
            }
            Ok(())
        }
        None => Err(anyhow!("Context \"{}\" not found", name)),
    }
}
