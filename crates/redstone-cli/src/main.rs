//! Redstone CLI - Command-line interface for the Redstone sync engine
//!
//! Provides commands for:
//! - Logging in to the notes server
//! - Editing files and folders in the local replica, online or not
//! - Running a sync and viewing sync status
//! - Recovering superseded edits

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    auth::AuthCommand, config::ConfigCommand, conflicts::ConflictsCommand, files::FilesCommand,
    folders::FoldersCommand, status::StatusCommand, sync::SyncCommand,
};
use context::AppContext;
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(name = "redstone", version, about = "Offline-first notes sync client")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Push local changes and pull remote ones
    Sync(SyncCommand),
    /// Show replica and sync status
    Status(StatusCommand),
    /// Create, edit and delete files
    #[command(subcommand)]
    Files(FilesCommand),
    /// Create, rename, move and delete folders
    #[command(subcommand)]
    Folders(FoldersCommand),
    /// Inspect and recover superseded edits
    #[command(subcommand)]
    Conflicts(ConflictsCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    let ctx = match AppContext::load(cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            get_formatter(format).error(&format!("{e:#}"));
            std::process::exit(1);
        }
    };
    init_tracing(&cli, &ctx);

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx, format).await,
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Files(cmd) => cmd.execute(&ctx, format).await,
        Commands::Folders(cmd) => cmd.execute(&ctx, format).await,
        Commands::Conflicts(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    }
}

/// RUST_LOG wins; otherwise -q / -v, then the configured level
fn init_tracing(cli: &Cli, ctx: &AppContext) {
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => ctx.config.logging.level.as_str(),
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if ctx.config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
