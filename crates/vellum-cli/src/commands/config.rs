//! Config command handlers

use anyhow::{bail, Context as _, Result};

use vellum_core::Config;

use super::{site, Context};
use crate::output::{mask, OutputFormat};

/// Show current configuration
pub fn show(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    let secret = |value: &Option<String>| value.as_deref().map(mask);

    match ctx.output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "supabase_url": config.supabase_url,
                    "supabase_anon_key": secret(&config.supabase_anon_key),
                    "email": config.email,
                    "password": secret(&config.password),
                    "default_site": config.default_site,
                    "vault_dir": config.vault_dir,
                    "data_dir": config.data_dir,
                    "bucket": config.bucket,
                    "log_file": config.log_file,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.default_site.as_deref().unwrap_or_default());
        }
        OutputFormat::Human => {
            let or_unset = |value: Option<String>| value.unwrap_or_else(|| "(not set)".to_string());
            println!("Configuration:");
            println!("  supabase_url:      {}", or_unset(config.supabase_url.clone()));
            println!(
                "  supabase_anon_key: {}",
                or_unset(secret(&config.supabase_anon_key))
            );
            println!("  email:             {}", or_unset(config.email.clone()));
            println!("  password:          {}", or_unset(secret(&config.password)));
            println!("  default_site:      {}", or_unset(config.default_site.clone()));
            println!("  vault_dir:         {}", config.vault_dir.display());
            println!("  data_dir:          {}", config.data_dir.display());
            println!("  bucket:            {}", config.bucket);
            println!(
                "  log_file:          {}",
                or_unset(config.log_file.as_ref().map(|p| p.display().to_string()))
            );
            println!();
            println!("Config file: {}", ctx.config_file().display());
        }
    }

    Ok(())
}

/// Set a configuration value
///
/// Setting `default_site` also checks that the site exists, offering to
/// create it when the remote is configured.
pub async fn set(ctx: &Context, key: String, value: String) -> Result<()> {
    let config_path = ctx.config_file();
    let mut config =
        Config::load_from_path(&config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    config
        .save_to_path(&config_path)
        .context("Failed to save configuration")?;

    let shown = match key.as_str() {
        "password" | "supabase_anon_key" => mask(&value),
        _ => value.clone(),
    };
    ctx.output.success(&format!("Set {} = {}", key, shown));

    if key == "default_site" && config.default_site.is_some() {
        if config.remote_settings().is_err() {
            ctx.output.message(
                "Set supabase_url and supabase_anon_key to check that the site exists.",
            );
            return Ok(());
        }
        site::ensure(ctx, &config, None).await?;
    }

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let optional = |value: &str| {
        if value.is_empty() || value == "none" {
            None
        } else {
            Some(value.to_string())
        }
    };

    match key {
        "supabase_url" => config.supabase_url = optional(value),
        "supabase_anon_key" => config.supabase_anon_key = optional(value),
        "email" => config.email = optional(value),
        "password" => config.password = optional(value),
        "default_site" => config.default_site = optional(value.trim()),
        "vault_dir" => config.vault_dir = value.into(),
        "data_dir" => config.data_dir = value.into(),
        "bucket" => {
            if value.is_empty() {
                bail!("bucket cannot be empty");
            }
            config.bucket = value.to_string();
        }
        "log_file" => config.log_file = optional(value).map(Into::into),
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: supabase_url, supabase_anon_key, email, password, \
                 default_site, vault_dir, data_dir, bucket, log_file",
                key
            );
        }
    }
    Ok(())
}
