//! Watch command handler
//!
//! Keeps the tombstone tracker current while the vault is edited: every
//! Markdown file that appears or changes is tracked, and every one that
//! is deleted has its remote revision marked removed. Removing a folder
//! retires every tracked document that lived under it.

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::event::{ModifyKind, RemoveKind};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use vellum_core::{FsVault, SupabaseClient, TombstoneOutcome, TombstoneTracker};

use super::{is_document, open_client, open_tracker, open_vault, Context};

/// A change to a document in the vault
#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    /// Created or modified; re-read its identity
    Touched(PathBuf),
    /// Renamed away; forget it without retiring anything
    MovedAway(PathBuf),
    Deleted(PathBuf),
    /// A folder went away along with whatever it held
    FolderRemoved(PathBuf),
}

/// Watch the vault until interrupted
pub async fn watch(ctx: &Context) -> Result<()> {
    let vault = open_vault(&ctx.config)?;
    let client = open_client(&ctx.config)?;
    let mut tracker = open_tracker(&ctx.config)?;

    let indexed = index_vault(&vault, &mut tracker);
    ctx.output.message(&format!(
        "Watching {} ({} documents tracked). Press Ctrl-C to stop.",
        vault.root().display(),
        indexed
    ));

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(vault.root(), RecursiveMode::Recursive)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                for change in classify(&event) {
                    handle(ctx, &client, &vault, &mut tracker, change).await;
                }
            }
        }
    }

    ctx.output.message("Stopped watching.");
    Ok(())
}

/// Track every document already in the vault
fn index_vault(vault: &FsVault, tracker: &mut TombstoneTracker) -> usize {
    let documents = match vault.documents() {
        Ok(documents) => documents,
        Err(e) => {
            warn!("Could not index vault: {}", e);
            return tracker.len();
        }
    };
    for doc in documents {
        if let Err(e) = tracker.on_menu_opened(vault, &doc) {
            warn!("Skipping {:?}: {}", doc, e);
        }
    }
    tracker.len()
}

fn classify(event: &Event) -> Vec<Change> {
    let documents = event.paths.iter().filter(|p| is_document(p));
    match event.kind {
        EventKind::Create(_) => documents.cloned().map(Change::Touched).collect(),
        EventKind::Modify(ModifyKind::Name(_)) => documents
            .map(|p| {
                if p.exists() {
                    Change::Touched(p.clone())
                } else {
                    Change::MovedAway(p.clone())
                }
            })
            .collect(),
        EventKind::Modify(_) => documents.cloned().map(Change::Touched).collect(),
        EventKind::Remove(kind) => event
            .paths
            .iter()
            .filter_map(|p| {
                if is_document(p) {
                    Some(Change::Deleted(p.clone()))
                } else if kind == RemoveKind::Folder || p.extension().is_none() {
                    Some(Change::FolderRemoved(p.clone()))
                } else {
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Tracked logical paths inside the folder `prefix`
fn tracked_under(tracker: &TombstoneTracker, prefix: &str) -> Vec<String> {
    let folder = format!("{}/", prefix.trim_end_matches('/'));
    tracker
        .iter()
        .filter(|(path, _)| path.starts_with(&folder))
        .map(|(path, _)| path.to_string())
        .collect()
}

/// Paths under hidden folders (`.obsidian`, `.trash`) are not documents
fn is_hidden(logical_path: &str) -> bool {
    logical_path.split('/').any(|part| part.starts_with('.'))
}

async fn handle(
    ctx: &Context,
    client: &SupabaseClient,
    vault: &FsVault,
    tracker: &mut TombstoneTracker,
    change: Change,
) {
    let path = match change {
        Change::Touched(ref p)
        | Change::MovedAway(ref p)
        | Change::Deleted(ref p)
        | Change::FolderRemoved(ref p) => p,
    };
    let logical_path = match vault.logical_path(path) {
        Ok(logical_path) if !is_hidden(&logical_path) => logical_path,
        _ => return,
    };

    debug!("Vault change: {:?}", change);
    match change {
        Change::Touched(path) => {
            if !path.exists() {
                return;
            }
            if let Err(e) = tracker.on_menu_opened(vault, &path) {
                warn!("Could not track {:?}: {}", path, e);
            }
        }
        Change::MovedAway(_) => {
            if tracker.record(&logical_path, None) {
                if let Err(e) = tracker.save() {
                    warn!("Could not save tracked documents: {}", e);
                }
            }
        }
        Change::Deleted(path) => retire(ctx, client, vault, tracker, &path).await,
        Change::FolderRemoved(_) => {
            for tracked in tracked_under(tracker, &logical_path) {
                let doc = vault.root().join(&tracked);
                retire(ctx, client, vault, tracker, &doc).await;
            }
        }
    }
}

async fn retire(
    ctx: &Context,
    client: &SupabaseClient,
    vault: &FsVault,
    tracker: &mut TombstoneTracker,
    path: &Path,
) {
    let result = tracker
        .on_deleted(client, vault, path, || ctx.config.credentials())
        .await;
    match result {
        Ok(TombstoneOutcome::Removed(identity)) => ctx
            .output
            .success(&format!("Marked {} ({}) as removed", path.display(), identity)),
        Ok(TombstoneOutcome::NeverPublished(identity)) => ctx.output.message(&format!(
            "{} ({}) has no published revision",
            path.display(),
            identity
        )),
        Ok(TombstoneOutcome::Untracked) => {}
        Err(e) => ctx
            .output
            .warn(&format!("Could not retire {}: {}", path.display(), e)),
    }
}
