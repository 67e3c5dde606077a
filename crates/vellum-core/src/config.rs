//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/vellum/config.toml)
//! 3. Environment variables (VELLUM_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::persist;
use crate::session::Credentials;

/// Environment variable prefix
const ENV_PREFIX: &str = "VELLUM";

/// Storage bucket used when none is configured
pub const DEFAULT_BUCKET: &str = "resources";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local state (session, tombstones)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root of the vault that documents and embeds are resolved against
    #[serde(default = "default_vault_dir")]
    pub vault_dir: PathBuf,

    /// Supabase project URL
    #[serde(default)]
    pub supabase_url: Option<String>,

    /// Supabase anon key
    #[serde(default)]
    pub supabase_anon_key: Option<String>,

    /// Sign-in email
    #[serde(default)]
    pub email: Option<String>,

    /// Sign-in password
    #[serde(default)]
    pub password: Option<String>,

    /// Site used when a document does not name one in its frontmatter
    #[serde(default)]
    pub default_site: Option<String>,

    /// Object storage bucket for embedded resources
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Log file (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Connection settings for the remote project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    pub anon_key: String,
    pub bucket: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            vault_dir: default_vault_dir(),
            supabase_url: None,
            supabase_anon_key: None,
            email: None,
            password: None,
            default_site: None,
            bucket: default_bucket(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Some(val) = env_value("DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Some(val) = env_value("VAULT_DIR") {
            self.vault_dir = PathBuf::from(val);
        }
        if let Some(val) = env_value("BUCKET") {
            if !val.is_empty() {
                self.bucket = val;
            }
        }

        // Empty strings clear optional settings
        for (name, slot) in [
            ("SUPABASE_URL", &mut self.supabase_url),
            ("SUPABASE_ANON_KEY", &mut self.supabase_anon_key),
            ("EMAIL", &mut self.email),
            ("PASSWORD", &mut self.password),
            ("DEFAULT_SITE", &mut self.default_site),
        ] {
            if let Some(val) = env_value(name) {
                *slot = if val.is_empty() { None } else { Some(val) };
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    ///
    /// The file is replaced atomically; missing parent directories are created.
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        persist::atomic_write(config_path, content.as_bytes())
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with VELLUM_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_value("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vellum")
            .join("config.toml")
    }

    /// Path of the persisted auth session
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    /// Path of the persisted tombstone index
    pub fn tombstones_path(&self) -> PathBuf {
        self.data_dir.join("tombstones.json")
    }

    /// Site a document targets: its own `site` key, else the default
    ///
    /// Blank values count as unset.
    pub fn target_site(&self, document_site: Option<&str>) -> Result<String, SyncError> {
        let non_blank = |s: &str| !s.trim().is_empty();
        document_site
            .filter(|s| non_blank(s))
            .or(self.default_site.as_deref().filter(|s| non_blank(s)))
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                SyncError::Configuration(
                    "A default site slug is required. Set it with:\n  \
                     vellum config set default_site <slug>"
                        .to_string(),
                )
            })
    }

    /// Validated connection settings
    pub fn remote_settings(&self) -> Result<RemoteSettings, SyncError> {
        let url = required(&self.supabase_url, "supabase_url")?;
        let anon_key = required(&self.supabase_anon_key, "supabase_anon_key")?;
        Ok(RemoteSettings {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
            bucket: self.bucket.clone(),
        })
    }

    /// Sign-in credentials
    pub fn credentials(&self) -> Result<Credentials, SyncError> {
        Ok(Credentials {
            email: required(&self.email, "email")?,
            password: required(&self.password, "password")?,
        })
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String, SyncError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            SyncError::Configuration(format!(
                "{key} is not configured. Set it with:\n  vellum config set {key} <value>"
            ))
        })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vellum")
}

fn default_vault_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}
