//! Command handlers

pub mod config;
pub mod hash;
pub mod push;
pub mod session;
pub mod site;
pub mod status;
pub mod track;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use vellum_core::{Config, FsVault, SupabaseClient, TombstoneTracker};

use crate::output::Output;
use crate::prompt::TerminalPrompt;

/// Everything a command needs from the command line
pub struct Context {
    pub config: Config,
    /// Config file given with `--config`
    pub config_path: Option<PathBuf>,
    pub output: Output,
    /// Create missing sites without asking
    pub assume_yes: bool,
}

impl Context {
    pub fn prompt(&self) -> TerminalPrompt {
        TerminalPrompt::new(self.output.should_prompt(), self.assume_yes)
    }

    /// Config file that `config set` writes to
    pub fn config_file(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(Config::config_file_path)
    }
}

/// Supabase client with the persisted session
pub fn open_client(config: &Config) -> Result<SupabaseClient> {
    let settings = config.remote_settings()?;
    let client = SupabaseClient::new(settings)?
        .with_session_path(config.session_path())
        .context("Failed to load session")?;
    Ok(client)
}

pub fn open_vault(config: &Config) -> Result<FsVault> {
    FsVault::new(&config.vault_dir)
        .with_context(|| format!("Failed to open vault {:?}", config.vault_dir))
}

pub fn open_tracker(config: &Config) -> Result<TombstoneTracker> {
    TombstoneTracker::with_path(config.tombstones_path())
        .context("Failed to load tracked documents")
}

/// Command-line paths are relative to the working directory
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    Ok(cwd.join(path))
}

/// Only Markdown files carry frontmatter, so only they are documents
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("md"))
}
