//! Conversations command - list, inspect, rename and delete conversations.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};
use ragchat_client::{PageQuery, Role};

use super::auth::{CredentialArgs, login};
use super::{Context, print_dim, print_json, print_sources};

/// Arguments for the conversations command.
#[derive(Args, Debug)]
pub struct ConversationsArgs {
    #[command(subcommand)]
    pub command: ConversationsCommand,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Subcommand, Debug)]
pub enum ConversationsCommand {
    /// List conversations, most recent first
    List {
        /// Page number (starting at 1)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Conversations per page
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },

    /// Create an empty conversation
    Create {
        /// Conversation title
        #[arg(long, default_value = "")]
        title: String,
    },

    /// Show a conversation with its messages
    Show {
        /// Conversation ID
        id: String,

        /// Include the sources of each answer
        #[arg(long)]
        sources: bool,
    },

    /// Rename a conversation
    Rename {
        /// Conversation ID
        id: String,

        /// New title
        title: String,
    },

    /// Delete a conversation and its messages
    Delete {
        /// Conversation ID
        id: String,
    },
}

/// Run the conversations command.
pub async fn run(args: ConversationsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    login(&client, &args.credentials).await?;
    let api = client.conversations();
    let dim = Style::new().dim();

    match args.command {
        ConversationsCommand::List { page, page_size } => {
            let listing = api.list(PageQuery { page, page_size }).await?;
            if ctx.json_output {
                return print_json(&listing);
            }
            if listing.items.is_empty() {
                print_dim("No conversations yet.");
                return Ok(());
            }
            println!("{:<38} {:<20} TITLE", "ID", "UPDATED");
            for conversation in &listing.items {
                println!(
                    "{:<38} {:<20} {}",
                    conversation.id,
                    short_time(&conversation.updated_at),
                    conversation.title
                );
            }
            if listing.has_more {
                print_dim(&format!("More on page {} (--page {})", page + 1, page + 1));
            }
        }
        ConversationsCommand::Create { title } => {
            let conversation = api.create(title).await?;
            if ctx.json_output {
                return print_json(&conversation);
            }
            println!("Created conversation {}", conversation.id);
        }
        ConversationsCommand::Show { id, sources } => {
            let detail = api.get(&id).await?;
            if ctx.json_output {
                return print_json(&detail);
            }
            println!("{}", style(&detail.title).bold());
            println!("{}", dim.apply_to(format!("{} · {}", detail.id, short_time(&detail.created_at))));
            println!();
            for message in detail.chat_messages() {
                let who = match message.role {
                    Role::User => style("you").cyan().bold(),
                    Role::Assistant => style("assistant").green().bold(),
                };
                println!("{}", who);
                println!("{}", message.content);
                if sources && let Some(list) = &message.sources {
                    print_sources(list);
                }
                println!();
            }
        }
        ConversationsCommand::Rename { id, title } => {
            let conversation = api.rename(&id, title).await?;
            if ctx.json_output {
                return print_json(&conversation);
            }
            println!("Renamed {} to \"{}\"", conversation.id, conversation.title);
        }
        ConversationsCommand::Delete { id } => {
            api.delete(&id).await?;
            if ctx.json_output {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted conversation {}", id);
        }
    }

    Ok(())
}

/// Trim a server timestamp to minutes for table output.
fn short_time(value: &str) -> String {
    value.get(..16).unwrap_or(value).replace('T', " ")
}
