//! Chat command - interactive REPL over a query session.

use std::io::Write;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, Term, style};
use ragchat_client::{QueryOptions, QuerySession, RagClient, Role};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use super::auth::{CredentialArgs, login};
use super::{Context, print_dim, print_error, print_sources};

/// How often the REPL redraws streamed text.
const REFRESH_INTERVAL: Duration = Duration::from_millis(40);

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Resume an existing conversation
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// Number of document chunks to retrieve (1-20)
    #[arg(short = 'k', long)]
    pub top_k: Option<u32>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    login(&client, &args.credentials).await?;

    let options = QueryOptions {
        top_k: args.top_k.or(ctx.settings.top_k),
    };
    let mut repl = Repl::new(client, options)?;
    if let Some(id) = args.conversation {
        repl.resume(&id).await?;
    }
    repl.run().await
}

/// REPL state and configuration.
pub struct Repl {
    client: RagClient,
    session: QuerySession,
    options: QueryOptions,
    editor: Editor<(), DefaultHistory>,
    term: Term,
}

/// Control flow for the REPL.
pub enum ControlFlow {
    Continue,
    Exit,
}

impl Repl {
    /// Create a new REPL instance.
    pub fn new(client: RagClient, options: QueryOptions) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        let editor = Editor::with_config(config)?;
        let session = QuerySession::with_conversation_created(client.clone(), |id| {
            tracing::info!(conversation_id = id, "Conversation created");
        });

        Ok(Self {
            client,
            session,
            options,
            editor,
            term: Term::stdout(),
        })
    }

    /// Load a stored conversation into the session.
    pub async fn resume(&mut self, id: &str) -> Result<()> {
        let detail = self
            .client
            .conversations()
            .get(id)
            .await
            .with_context(|| format!("Failed to load conversation {}", id))?;
        self.session.resume(detail.id.clone(), detail.chat_messages());
        print_dim(&format!(
            "Resumed \"{}\" ({} messages)",
            detail.title,
            detail.messages.len()
        ));
        Ok(())
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = format!("{} ", style("ragchat>").cyan().bold());

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    // Handle slash commands
                    if line.starts_with('/') {
                        match self.handle_slash_command(line).await {
                            Ok(ControlFlow::Continue) => continue,
                            Ok(ControlFlow::Exit) => break,
                            Err(e) => {
                                print_error(&format!("Command error: {}", e));
                                continue;
                            }
                        }
                    }

                    if let Err(e) = self.ask(line).await {
                        print_error(&e.to_string());
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    print_dim("(Interrupted - type /quit to exit)");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        print_dim("Goodbye!");
        Ok(())
    }

    /// Send a question and echo the answer while it streams.
    ///
    /// Ctrl+C cancels the stream; any partial answer is kept.
    async fn ask(&mut self, question: &str) -> Result<()> {
        let before = self.session.state().messages.len();
        let mut task = {
            let session = self.session.clone();
            let question = question.to_string();
            let options = self.options;
            tokio::spawn(async move { session.send_query(&question, options).await })
        };

        let mut printed = 0;
        loop {
            let finished = tokio::select! {
                result = &mut task => {
                    result?;
                    true
                }
                _ = tokio::signal::ctrl_c() => {
                    self.session.cancel();
                    false
                }
                _ = tokio::time::sleep(REFRESH_INTERVAL) => false,
            };

            let state = self.session.state();
            if let Some(fresh) = state.streaming_content.get(printed..)
                && !fresh.is_empty()
            {
                print!("{}", fresh);
                std::io::stdout().flush()?;
                printed = state.streaming_content.len();
            }
            if finished {
                break;
            }
        }

        let state = self.session.state();
        let answer = state
            .messages
            .get(before + 1)
            .filter(|m| m.role == Role::Assistant);
        if let Some(rest) = answer.and_then(|m| m.content.get(printed..)) {
            print!("{}", rest);
        }
        if printed > 0 || answer.is_some() {
            println!();
            println!();
        }

        if let Some(error) = &state.error {
            if state.is_rate_limited {
                print_error(&format!("{} (rate limited, wait a moment then /retry)", error));
            } else {
                print_error(&format!("{} (use /retry to ask again)", error));
            }
        }
        Ok(())
    }

    /// Handle a slash command.
    async fn handle_slash_command(&mut self, input: &str) -> Result<ControlFlow> {
        let parts: Vec<&str> = input[1..].split_whitespace().collect();
        let cmd = parts.first().copied().unwrap_or("");

        match cmd {
            "quit" | "q" | "exit" => {
                return Ok(ControlFlow::Exit);
            }
            "help" | "h" | "?" => {
                self.print_help();
            }
            "clear" | "cls" => {
                self.term.clear_screen()?;
            }
            "new" => {
                self.session.reset();
                print_dim("Started new conversation");
            }
            "conversation" => match self.session.conversation_id() {
                Some(id) => println!("Current conversation: {}", id),
                None => print_dim("No conversation yet (created on first question)"),
            },
            "history" => {
                self.print_history();
            }
            "sources" => {
                let state = self.session.state();
                let sources = state
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant)
                    .and_then(|m| m.sources.clone())
                    .unwrap_or_default();
                if sources.is_empty() {
                    print_dim("No sources for the last answer");
                } else {
                    print_sources(&sources);
                }
            }
            "retry" => {
                let question = self.session.state().last_question().map(str::to_string);
                match question {
                    Some(question) => {
                        print_dim(&format!("Retrying: {}", question));
                        self.ask(&question).await?;
                    }
                    None => print_dim("Nothing to retry"),
                }
            }
            "" => {
                print_dim("Type /help for available commands");
            }
            _ => {
                print_error(&format!("Unknown command: /{}", cmd));
                print_dim("Type /help for available commands");
            }
        }

        Ok(ControlFlow::Continue)
    }

    fn print_history(&self) {
        let state = self.session.state();
        if state.messages.is_empty() {
            print_dim("No messages yet");
            return;
        }
        let dim = Style::new().dim();
        for message in &state.messages {
            let who = match message.role {
                Role::User => style("you").cyan().bold(),
                Role::Assistant => style("assistant").green().bold(),
            };
            println!(
                "{} {}",
                who,
                dim.apply_to(message.timestamp.format("%Y-%m-%d %H:%M"))
            );
            println!("{}", message.content);
            println!();
        }
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("ragchat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("{}", dim.apply_to("Ask a question about your documents."));
        println!("{}", dim.apply_to("Use /help for commands, Ctrl+D to exit."));
        println!();
    }

    fn print_help(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("Available Commands").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {}  - Exit the REPL", style("/quit, /q").cyan());
        println!("  {}  - Show this help", style("/help, /h, /?").cyan());
        println!("  {}  - Clear the screen", style("/clear").cyan());
        println!("  {}  - Start a new conversation", style("/new").cyan());
        println!("  {}  - Show the conversation ID", style("/conversation").cyan());
        println!("  {}  - Show the messages so far", style("/history").cyan());
        println!("  {}  - Show sources of the last answer", style("/sources").cyan());
        println!("  {}  - Ask the last question again", style("/retry").cyan());
        println!();
        println!("{}", dim.apply_to("Keyboard shortcuts:"));
        println!("  {} - Stop the current answer", dim.apply_to("Ctrl+C"));
        println!("  {} - Exit the REPL", dim.apply_to("Ctrl+D"));
        println!();
    }
}
