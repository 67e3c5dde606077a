//! Push command handler

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::warn;

use vellum_core::{
    FixedAnswer, FsVault, MemoryRemote, Prompt, RemoteStore, SessionService, SyncOutcome, Syncer,
    TombstoneTracker, User,
};

use super::{absolute, is_document, open_client, open_tracker, open_vault, Context};

/// Push documents to their site
pub async fn push(ctx: &Context, files: &[PathBuf], dry_run: bool) -> Result<()> {
    let docs = files
        .iter()
        .map(|f| absolute(f))
        .collect::<Result<Vec<_>>>()?;
    if let Some(doc) = docs.iter().find(|d| !is_document(d)) {
        bail!(
            "{} is not a Markdown document; only .md files can be pushed",
            doc.display()
        );
    }

    if dry_run {
        let vault = FsVault::dry_run(&ctx.config.vault_dir)?;
        let remote = dry_run_remote(ctx);
        ctx.output
            .message("Dry run: nothing is written to the vault or the remote site.");
        return push_all(ctx, &remote, &vault, &FixedAnswer(true), &docs, None).await;
    }

    let vault = open_vault(&ctx.config)?;
    let client = open_client(&ctx.config)?;
    let mut tracker = open_tracker(&ctx.config)?;
    let prompt = ctx.prompt();
    push_all(ctx, &client, &vault, &prompt, &docs, Some(&mut tracker)).await
}

/// An in-memory remote that already holds the default site
fn dry_run_remote(ctx: &Context) -> MemoryRemote {
    let user = User {
        id: "dry-run".to_string(),
        email: ctx.config.email.clone(),
    };
    let remote = MemoryRemote::new().with_session(user);
    match ctx.config.default_site.as_deref() {
        Some(site) if !site.trim().is_empty() => remote.with_site(site.trim(), "dry-run"),
        _ => remote,
    }
}

async fn push_all<C, P>(
    ctx: &Context,
    client: &C,
    vault: &FsVault,
    prompt: &P,
    docs: &[PathBuf],
    mut tracker: Option<&mut TombstoneTracker>,
) -> Result<()>
where
    C: SessionService + RemoteStore,
    P: Prompt,
{
    let dry_run = tracker.is_none();
    let syncer = Syncer::new(client, vault, prompt, &ctx.config);
    let mut failures = 0;

    for doc in docs {
        match syncer.push(doc).await {
            Ok(SyncOutcome::Done(report)) => {
                // A pushed document can be retired later, so remember it
                if let Some(tracker) = tracker.as_deref_mut() {
                    tracker.record(&report.document, Some(report.identity.clone()));
                    if let Err(e) = tracker.save() {
                        warn!("Could not save tracked documents: {}", e);
                    }
                }
                ctx.output.print_report(&report, dry_run);
            }
            Ok(SyncOutcome::Cancelled { site }) => ctx.output.print_cancelled(doc, &site),
            Err(e) if docs.len() == 1 => return Err(e.into()),
            Err(e) => {
                failures += 1;
                ctx.output.warn(&format!("{}: {}", doc.display(), e));
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} documents failed to push", failures, docs.len());
    }
    Ok(())
}
