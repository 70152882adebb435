//! Authentication helpers and the register command.
//!
//! Access tokens live only in memory, so every command that talks to
//! protected endpoints logs in first.

use std::io::Write;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use console::Style;
use ragchat_client::{RagClient, RegisterRequest};

use super::{Context, print_json};

/// Environment variable holding the account password.
const PASSWORD_ENV: &str = "RAGCHAT_PASSWORD";

/// Minimum password length accepted by the server.
const MIN_PASSWORD_LEN: usize = 8;

/// Account credentials.
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Account email (prompted for when omitted)
    #[arg(long, env = "RAGCHAT_EMAIL")]
    pub email: Option<String>,
}

impl CredentialArgs {
    fn email(&self) -> Result<String> {
        match &self.email {
            Some(email) => Ok(email.clone()),
            None => prompt_line("Email: "),
        }
    }
}

/// Arguments for the register command.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Display name for the account
    #[arg(long)]
    pub username: String,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Log in with the given credentials, holding the access token in `client`.
pub async fn login(client: &RagClient, credentials: &CredentialArgs) -> Result<()> {
    let email = credentials.email()?;
    let password = password()?;
    client
        .auth()
        .login(email, password)
        .await
        .context("Login failed")?;
    Ok(())
}

/// Run the register command.
pub async fn register(args: RegisterArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let email = args.credentials.email()?;
    let password = password()?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("Password must be at least {} characters", MIN_PASSWORD_LEN);
    }

    let user = client
        .auth()
        .register(RegisterRequest {
            email,
            username: args.username,
            password,
        })
        .await
        .context("Registration failed")?;

    if ctx.json_output {
        return print_json(&user);
    }

    let green = Style::new().green();
    println!(
        "{} Registered {} <{}>",
        green.apply_to("✓"),
        user.username,
        user.email
    );
    Ok(())
}

fn password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV)
        && !password.is_empty()
    {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let line = line.trim();
    if line.is_empty() {
        bail!("No value entered");
    }
    Ok(line.to_string())
}
