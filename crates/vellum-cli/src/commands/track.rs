//! Tracking and deletion handlers
//!
//! `track` remembers the identity of documents so that `deleted` can
//! retire their remote revisions once the files are gone. `rm` does both
//! steps for a file that still exists.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use vellum_core::{FsVault, SupabaseClient, TombstoneOutcome, TombstoneTracker};

use super::{absolute, open_client, open_tracker, open_vault, Context};

/// Remember the identities of documents
pub fn track(ctx: &Context, files: &[PathBuf]) -> Result<()> {
    let vault = open_vault(&ctx.config)?;
    let mut tracker = open_tracker(&ctx.config)?;

    for file in files {
        let doc = absolute(file)?;
        let logical_path = vault.logical_path(&doc)?;
        match tracker.on_menu_opened(&vault, &doc)? {
            Some(identity) => {
                ctx.output
                    .success(&format!("Tracking {} as {}", logical_path, identity))
            }
            None => ctx.output.message(&format!(
                "{} has not been pushed yet; nothing to track",
                logical_path
            )),
        }
    }
    Ok(())
}

/// Mark the remote revisions of deleted documents as removed
pub async fn deleted(ctx: &Context, files: &[PathBuf]) -> Result<()> {
    let vault = open_vault(&ctx.config)?;
    let mut tracker = open_tracker(&ctx.config)?;

    for file in files {
        let doc = absolute(file)?;
        let logical_path = vault.logical_path(&doc)?;

        // Untracked paths never touch the network, so don't require a remote
        if tracker.pending(&logical_path).is_none() {
            untracked(ctx, &logical_path);
            continue;
        }

        let client = match open_client(&ctx.config) {
            Ok(client) => client,
            Err(e) => {
                // The document is gone either way; don't keep its identity around
                tracker.record(&logical_path, None);
                tracker.save()?;
                return Err(e);
            }
        };
        retire(ctx, &client, &vault, &mut tracker, &doc).await?;
    }
    Ok(())
}

/// Delete documents from the vault and retire their remote revisions
pub async fn rm(ctx: &Context, files: &[PathBuf]) -> Result<()> {
    let vault = open_vault(&ctx.config)?;
    let mut tracker = open_tracker(&ctx.config)?;

    for file in files {
        let doc = absolute(file)?;
        let logical_path = vault.logical_path(&doc)?;

        // Build the client first so a broken remote leaves the file in place
        let client = match tracker.on_menu_opened(&vault, &doc)? {
            Some(_) => Some(open_client(&ctx.config)?),
            None => None,
        };
        std::fs::remove_file(&doc).with_context(|| format!("Failed to delete {:?}", doc))?;

        match client {
            Some(client) => retire(ctx, &client, &vault, &mut tracker, &doc).await?,
            None => untracked(ctx, &logical_path),
        }
    }
    Ok(())
}

async fn retire(
    ctx: &Context,
    client: &SupabaseClient,
    vault: &FsVault,
    tracker: &mut TombstoneTracker,
    doc: &Path,
) -> Result<()> {
    let logical_path = vault.logical_path(doc)?;
    let outcome = tracker
        .on_deleted(client, vault, doc, || ctx.config.credentials())
        .await?;

    match outcome {
        TombstoneOutcome::Removed(identity) => ctx.output.success(&format!(
            "Marked {} ({}) as removed",
            logical_path, identity
        )),
        TombstoneOutcome::NeverPublished(identity) => ctx.output.message(&format!(
            "{} ({}) has no published revision",
            logical_path, identity
        )),
        TombstoneOutcome::Untracked => untracked(ctx, &logical_path),
    }
    Ok(())
}

fn untracked(ctx: &Context, logical_path: &str) {
    ctx.output
        .message(&format!("{} was not tracked; nothing to remove", logical_path));
}
