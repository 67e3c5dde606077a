//! Status command handler

use anyhow::Result;

use vellum_core::{SessionService, SupabaseClient};

use super::{open_tracker, Context};
use crate::output::OutputFormat;

/// Show status information
pub async fn show(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    let tracker = open_tracker(config)?;

    let remote = config.remote_settings().ok();
    let signed_in_as = match remote {
        Some(ref settings) => {
            let client = SupabaseClient::new(settings.clone())?
                .with_session_path(config.session_path())?;
            if client.has_active_session().await {
                client.session().map(|s| s.user)
            } else {
                None
            }
        }
        None => None,
    };

    match ctx.output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "remote": remote.as_ref().map(|r| &r.url),
                    "bucket": config.bucket,
                    "default_site": config.default_site,
                    "vault_dir": config.vault_dir,
                    "signed_in": signed_in_as.is_some(),
                    "user": signed_in_as,
                    "tracked_documents": tracker.len(),
                })
            );
        }
        OutputFormat::Quiet => {
            let state = if signed_in_as.is_some() {
                "signed-in"
            } else {
                "signed-out"
            };
            println!("{}", state);
        }
        OutputFormat::Human => {
            println!("Vellum Status");
            println!("=============");
            println!();
            println!("Remote:");
            match remote {
                Some(ref settings) => {
                    println!("  Project: {}", settings.url);
                    println!("  Bucket:  {}", settings.bucket);
                }
                None => println!("  Not configured (set supabase_url and supabase_anon_key)"),
            }
            println!(
                "  Site:    {}",
                config.default_site.as_deref().unwrap_or("(not set)")
            );
            println!();
            println!("Session:");
            match signed_in_as {
                Some(ref user) => println!(
                    "  Signed in as {}",
                    user.email.as_deref().unwrap_or(&user.id)
                ),
                None => println!("  Signed out"),
            }
            println!();
            println!("Vault:");
            println!("  Location: {}", config.vault_dir.display());
            println!("  Tracked:  {} document(s)", tracker.len());
        }
    }

    Ok(())
}
