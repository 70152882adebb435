//! Health command - server and dependency status.

use anyhow::{Result, bail};
use clap::Args;
use console::Style;

use super::{Context, print_json};

/// Arguments for the health command.
#[derive(Args, Debug)]
pub struct HealthArgs {}

/// Run the health command.
pub async fn run(_args: HealthArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let dim = Style::new().dim();

    let health = match client.health().check().await {
        Ok(health) => health,
        Err(e) => {
            if ctx.json_output {
                print_json(&serde_json::json!({ "status": "unreachable", "error": e.to_string() }))?;
            } else {
                let red = Style::new().red();
                println!("Server: {}", red.apply_to("● unreachable"));
                println!("  {}", dim.apply_to(&ctx.server_url));
            }
            bail!("Server is unreachable: {}", e);
        }
    };

    if ctx.json_output {
        print_json(&health)?;
    } else {
        let status = if health.is_healthy() {
            Style::new().green().apply_to("● healthy")
        } else {
            Style::new().red().apply_to("● unhealthy")
        };
        println!("Server: {}", status);
        println!("  {}", dim.apply_to(&ctx.server_url));
        if let Some(database) = &health.database {
            println!("  Database: {}", database);
        }
        if let Some(redis) = &health.redis {
            println!("  Redis:    {}", redis);
        }
    }

    if !health.is_healthy() {
        bail!("Server reported status '{}'", health.status);
    }
    Ok(())
}
