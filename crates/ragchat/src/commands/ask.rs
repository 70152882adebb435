//! Ask command - one-shot question over your documents.

use std::io::Write;
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Args;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use ragchat_client::{QueryRequest, Source, StreamEvent, StreamHandler, Usage};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::auth::{CredentialArgs, login};
use super::{Context, print_dim, print_json, print_sources};

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question to ask
    #[arg(required = true)]
    pub question: String,

    /// Number of document chunks to retrieve (1-20)
    #[arg(short = 'k', long)]
    pub top_k: Option<u32>,

    /// Continue an existing conversation
    #[arg(short, long)]
    pub conversation: Option<String>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Everything received for one answer.
#[derive(Debug, Default, Serialize)]
struct Answer {
    conversation_id: Option<String>,
    answer: String,
    sources: Vec<Source>,
    usage: Option<Usage>,
    cancelled: bool,
    #[serde(skip)]
    error: Option<(String, Option<u16>)>,
}

/// Prints answer text as it streams in.
struct PrintHandler {
    answer: Answer,
    echo: bool,
    spinner: Option<ProgressBar>,
}

impl PrintHandler {
    fn new(echo: bool) -> Self {
        let spinner = echo.then(|| {
            let spinner = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
                spinner.set_style(style);
            }
            spinner.set_message("Searching documents...");
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        Self {
            answer: Answer::default(),
            echo,
            spinner,
        }
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn write(&mut self, text: &str) {
        self.clear_spinner();
        if self.echo {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
        self.answer.answer.push_str(text);
    }
}

impl StreamHandler for PrintHandler {
    fn on_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ConversationId(id) => self.answer.conversation_id = Some(id),
            StreamEvent::Sources(sources) => self.answer.sources = sources,
            StreamEvent::Delta(text) => self.write(&text),
            StreamEvent::Usage(usage) => self.answer.usage = Some(usage),
            StreamEvent::Done(done) => {
                if self.answer.answer.is_empty() {
                    self.write(&done.full_text);
                }
            }
            // The error event payload carries no HTTP status
            StreamEvent::Error(error) => self.on_error(error.detail, None),
        }
    }

    fn on_error(&mut self, message: String, status: Option<u16>) {
        self.clear_spinner();
        if self.answer.error.is_none() {
            self.answer.error = Some((message, status));
        }
    }

    fn on_parse_error(&mut self, message: String) {
        tracing::warn!(%message, "Skipping undecodable stream event");
    }

    fn on_done(&mut self) {
        self.clear_spinner();
    }
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let mut request = QueryRequest::new(args.question);
    request.top_k = args.top_k.or(ctx.settings.top_k);
    request.conversation_id = args.conversation;
    request.validate()?;

    let client = ctx.client()?;
    login(&client, &args.credentials).await?;

    if ctx.verbose {
        print_dim(&format!("Sending to: {}", ctx.server_url));
    }

    // Ctrl+C stops the stream but keeps what has arrived
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let mut handler = PrintHandler::new(!ctx.json_output);
    client.chat().query(&request, &mut handler, &cancel).await;
    watcher.abort();

    let mut answer = handler.answer;
    answer.cancelled = cancel.is_cancelled();

    if let Some((message, status)) = answer.error.take() {
        if !ctx.json_output && !answer.answer.is_empty() {
            println!();
        }
        if status == Some(429) {
            return Err(anyhow!("{} (rate limited, wait a moment and retry)", message));
        }
        return Err(anyhow!(message));
    }

    if ctx.json_output {
        return print_json(&answer);
    }

    if !answer.answer.is_empty() {
        println!();
    }
    if answer.cancelled {
        print_dim("(cancelled)");
    }
    if !answer.sources.is_empty() {
        println!();
        println!("{}", Style::new().bold().apply_to("Sources"));
        print_sources(&answer.sources);
    }
    if ctx.verbose {
        if let Some(id) = &answer.conversation_id {
            print_dim(&format!("Conversation: {}", id));
        }
        if let Some(usage) = answer.usage {
            print_dim(&format!(
                "Tokens: {} prompt + {} completion = {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            ));
        }
    }

    Ok(())
}
