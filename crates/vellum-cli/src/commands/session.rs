//! Session command handlers

use anyhow::Result;

use vellum_core::{ensure_session, SessionService, SyncError};

use super::{open_client, Context};

/// Sign in with the configured credentials
pub async fn login(ctx: &Context) -> Result<()> {
    let client = open_client(&ctx.config)?;
    let user = ensure_session(&client, || ctx.config.credentials()).await?;
    ctx.output.success(&format!(
        "Signed in as {}",
        user.email.as_deref().unwrap_or(&user.id)
    ));
    Ok(())
}

/// Sign out and forget the stored session
pub async fn logout(ctx: &Context) -> Result<()> {
    let client = open_client(&ctx.config)?;
    client
        .sign_out()
        .await
        .map_err(|e| SyncError::remote("sign out", e))?;
    ctx.output.success("Signed out");
    Ok(())
}
