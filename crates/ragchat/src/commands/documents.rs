//! Documents command - upload and manage documents.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use console::Style;
use indicatif::ProgressBar;
use ragchat_client::{PageQuery, UploadFile};

use super::auth::{CredentialArgs, login};
use super::{Context, print_dim, print_json};

/// Arguments for the documents command.
#[derive(Args, Debug)]
pub struct DocumentsArgs {
    #[command(subcommand)]
    pub command: DocumentsCommand,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

#[derive(Subcommand, Debug)]
pub enum DocumentsCommand {
    /// Upload files (PDF, DOCX, TXT, Markdown) for ingestion
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List documents
    List {
        /// Page number (starting at 1)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Documents per page
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },

    /// Show a document's metadata
    Show {
        /// Document ID
        id: String,

        /// Print the extracted text
        #[arg(long)]
        content: bool,
    },

    /// Delete a document and its chunks
    Delete {
        /// Document ID
        id: String,
    },
}

/// Run the documents command.
pub async fn run(args: DocumentsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    login(&client, &args.credentials).await?;
    let api = client.documents();

    match args.command {
        DocumentsCommand::Upload { files } => {
            let uploads = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<Result<Vec<_>>>()?;

            let spinner = (!ctx.json_output).then(|| {
                let spinner = ProgressBar::new_spinner();
                spinner.set_message(format!("Uploading {} file(s)...", uploads.len()));
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner
            });
            let result = api.upload(&uploads).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            let uploaded = result?;

            if ctx.json_output {
                return print_json(&uploaded);
            }
            let green = Style::new().green();
            for doc in &uploaded {
                println!(
                    "{} {} ({} chunks) {}",
                    green.apply_to("✓"),
                    doc.filename,
                    doc.chunk_count,
                    Style::new().dim().apply_to(&doc.id)
                );
            }
            let skipped = uploads.len().saturating_sub(uploaded.len());
            if skipped > 0 {
                print_dim(&format!("{} file(s) were rejected by the server", skipped));
            }
        }
        DocumentsCommand::List { page, page_size } => {
            let listing = api.list(PageQuery { page, page_size }).await?;
            if ctx.json_output {
                return print_json(&listing);
            }
            if listing.items.is_empty() {
                print_dim("No documents uploaded.");
                return Ok(());
            }
            println!("{:<38} {:<6} {:>10} {:>7}  FILENAME", "ID", "TYPE", "SIZE", "CHUNKS");
            for doc in &listing.items {
                println!(
                    "{:<38} {:<6} {:>10} {:>7}  {}",
                    doc.id,
                    doc.file_type,
                    human_size(doc.file_size),
                    doc.chunk_count,
                    doc.filename
                );
            }
            if listing.has_more {
                print_dim(&format!("More on page {} (--page {})", page + 1, page + 1));
            }
        }
        DocumentsCommand::Show { id, content } => {
            let doc = api.get(&id).await?;
            if ctx.json_output {
                return print_json(&doc);
            }
            println!("{}", Style::new().bold().apply_to(&doc.filename));
            println!("  ID:      {}", doc.id);
            println!("  Type:    {}", doc.file_type);
            println!("  Size:    {}", human_size(doc.file_size));
            println!("  Chunks:  {}", doc.chunk_count);
            println!("  Created: {}", doc.created_at);
            if content {
                println!();
                println!("{}", doc.content);
            }
        }
        DocumentsCommand::Delete { id } => {
            api.delete(&id).await?;
            if ctx.json_output {
                return print_json(&serde_json::json!({ "deleted": id }));
            }
            println!("Deleted document {}", id);
        }
    }

    Ok(())
}

fn read_upload(path: &Path) -> Result<UploadFile> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file: {}", path.display()))?;
    Ok(UploadFile::new(filename, content))
}

/// Format a byte count for display.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
