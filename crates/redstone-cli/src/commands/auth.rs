//! Auth command - Log in to the notes server
//!
//! Provides the `redstone auth` CLI command which:
//! 1. Exchanges email and password for a bearer token
//! 2. Stores the token in the system keyring
//! 3. Records the account in the configuration file

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use redstone_api::{login, ApiClient, KeyringCredentialStore};
use redstone_core::ports::StaticCredentials;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Log in with email and password
    Login {
        /// Account email
        #[arg(long)]
        email: String,
        /// Password; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Remove the stored token
    Logout,
    /// Show the current account
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        match self {
            AuthCommand::Login { email, password } => {
                self.execute_login(ctx, email, password.as_deref(), format)
                    .await
            }
            AuthCommand::Logout => self.execute_logout(ctx, format),
            AuthCommand::Status => self.execute_status(ctx, format),
        }
    }

    async fn execute_login(
        &self,
        ctx: &AppContext,
        email: &str,
        password: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let password = match password {
            Some(password) => password.to_string(),
            None => read_password()?,
        };

        let client = ApiClient::new(&ctx.config.remote, Arc::new(StaticCredentials::anonymous()))?;
        let response = login(&client, email, &password)
            .await
            .context("Login failed")?;

        KeyringCredentialStore::new(email).store(&response.token)?;

        let mut config = ctx.config.clone();
        config.auth.user = Some(email.to_string());
        config.save(&ctx.config_path)?;
        info!(email, config = %ctx.config_path.display(), "Account saved");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "user": {
                    "id": response.user.id,
                    "email": response.user.email,
                    "name": response.user.name,
                },
            }));
        } else {
            formatter.success(&format!("Logged in as {}", response.user.email));
            if ctx.config.auth.token.is_some() {
                formatter.warn("auth.token is set in the config file and overrides the keyring");
            }
        }
        Ok(())
    }

    fn execute_logout(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(user) = ctx.config.auth.user.as_deref() else {
            formatter.info("Not logged in");
            return Ok(());
        };

        KeyringCredentialStore::new(user).clear()?;
        let mut config = ctx.config.clone();
        config.auth.user = None;
        config.save(&ctx.config_path)?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({"success": true, "user": user}));
        } else {
            formatter.success(&format!("Logged out {user}"));
            formatter.info("The local replica is kept and syncs again after the next login");
        }
        Ok(())
    }

    fn execute_status(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let user = ctx.config.auth.user.as_deref();
        let token_source = match user {
            None => None,
            Some(_) if ctx.config.auth.token.is_some() => Some("config"),
            Some(user) => KeyringCredentialStore::new(user)
                .load()?
                .map(|_| "keyring"),
        };

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "user": user,
                "authenticated": token_source.is_some(),
                "tokenSource": token_source,
                "server": ctx.config.remote.base_url,
            }));
            return Ok(());
        }

        match (user, token_source) {
            (None, _) => formatter.warn("Not logged in. Run 'redstone auth login'"),
            (Some(user), None) => {
                formatter.warn(&format!("{user} has no stored token. Run 'redstone auth login'"))
            }
            (Some(user), Some(source)) => {
                formatter.success(&format!("Logged in as {user}"));
                formatter.info(&format!("Token: {source}"));
            }
        }
        formatter.info(&format!("Server: {}", ctx.config.remote.base_url));
        Ok(())
    }
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    anyhow::ensure!(!password.is_empty(), "Password cannot be empty");
    Ok(password)
}
