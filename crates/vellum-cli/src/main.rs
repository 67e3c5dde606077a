//! Vellum CLI
//!
//! Command-line interface for Vellum - publish vault documents to a site.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vellum_core::{Config, SyncError};

mod commands;
mod output;
mod prompt;

use commands::Context;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "vellum")]
#[command(about = "Vellum - Publish vault documents and their media to a site")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Create missing sites without asking
    #[arg(short, long, global = true)]
    yes: bool,

    /// Config file to use instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Vault directory (overrides vault_dir)
    #[arg(long, global = true, value_name = "DIR")]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push documents and the media they embed
    Push {
        /// Documents to push
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Run against an in-memory remote and leave files untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Remember document identities so deletions can be published
    Track {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Mark the remote revisions of already deleted documents as removed
    Deleted {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete documents and mark their remote revisions as removed
    Rm {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Watch the vault and publish deletions as they happen
    Watch,
    /// Manage sites
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (remote, session, tracked documents)
    Status,
    /// Sign in with the configured credentials
    Login,
    /// Sign out and forget the stored session
    Logout,
    /// Print the content address of a resource path
    Hash {
        /// File in the vault, or a vault-relative path
        path: String,
    },
}

#[derive(Subcommand)]
enum SiteCommands {
    /// Check that a site exists, offering to create it
    Ensure {
        /// Site slug (defaults to default_site)
        slug: Option<String>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (supabase_url, email, default_site, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    let mut config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    if let Some(vault) = cli.vault {
        config.vault_dir = vault;
    }
    init_logging(&config);

    let ctx = Context {
        config,
        config_path: cli.config,
        output,
        assume_yes: cli.yes,
    };

    let result = match cli.command {
        Commands::Push { files, dry_run } => commands::push::push(&ctx, &files, dry_run).await,
        Commands::Track { files } => commands::track::track(&ctx, &files),
        Commands::Deleted { files } => commands::track::deleted(&ctx, &files).await,
        Commands::Rm { files } => commands::track::rm(&ctx, &files).await,
        Commands::Watch => commands::watch::watch(&ctx).await,
        Commands::Site { command } => match command {
            SiteCommands::Ensure { slug } => {
                commands::site::ensure(&ctx, &ctx.config, slug.as_deref()).await
            }
        },
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config::show(&ctx),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(&ctx, key, value).await
            }
        },
        Commands::Status => commands::status::show(&ctx).await,
        Commands::Login => commands::session::login(&ctx).await,
        Commands::Logout => commands::session::logout(&ctx).await,
        Commands::Hash { path } => commands::hash::hash(&ctx, &path),
    };

    if let Err(ref e) = result {
        let hint = e
            .downcast_ref::<SyncError>()
            .and_then(SyncError::recovery_suggestion);
        if let (Some(hint), false) = (hint, ctx.output.is_json()) {
            eprintln!("{}", hint);
        }
    }

    result
}

/// Log to `log_file` (or stderr) when VELLUM_LOG is set
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("VELLUM_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "vellum_core={},vellum_cli={}",
        log_level, log_level
    ));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore the error if a subscriber is already installed
    let _ = match config.log_file {
        Some(ref log_path) => {
            let log_file = match File::options().create(true).append(true).open(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
                    return;
                }
            };
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(log_file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}
