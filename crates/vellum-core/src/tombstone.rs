//! Deletion tombstones
//!
//! Once a document file is deleted its frontmatter is gone with it, so the
//! identity needed to retire the remote revision has to be remembered
//! beforehand. The tracker keeps one identity per vault-relative path,
//! recorded whenever a document is opened or seen changing, and persisted
//! between runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RemoteError, SyncError, SyncResult};
use crate::models::DocumentId;
use crate::persist;
use crate::remote::{RemoteStore, SessionService};
use crate::session::{ensure_session, Credentials};
use crate::vault::DocumentStore;

/// Result of handling a deleted document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TombstoneOutcome {
    /// No identity was known for the path; nothing was sent
    Untracked,
    /// The latest revision of the identity is now marked removed
    Removed(DocumentId),
    /// The identity has no revision remotely
    NeverPublished(DocumentId),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TombstoneFile {
    #[serde(default)]
    entries: BTreeMap<String, DocumentId>,
}

/// Identities of known documents, keyed by vault-relative path
#[derive(Debug, Default)]
pub struct TombstoneTracker {
    entries: BTreeMap<String, DocumentId>,
    path: Option<PathBuf>,
}

impl TombstoneTracker {
    /// Create a tracker that lives in memory only
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the tracker persisted at `path`, or start empty
    pub fn with_path(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file: Option<TombstoneFile> = persist::read_json(&path)?;
        let entries = file.map(|f| f.entries).unwrap_or_default();
        debug!("Loaded {} tracked documents from {:?}", entries.len(), path);
        Ok(Self {
            entries,
            path: Some(path),
        })
    }

    /// Persist the tracker, if it has a backing file
    pub fn save(&self) -> SyncResult<()> {
        match self.path {
            Some(ref path) => persist::write_json(
                path,
                &TombstoneFile {
                    entries: self.entries.clone(),
                },
            ),
            None => Ok(()),
        }
    }

    /// Remember or forget the identity for `logical_path`
    ///
    /// Returns whether anything changed.
    pub fn record(&mut self, logical_path: &str, identity: Option<DocumentId>) -> bool {
        match identity {
            Some(identity) => {
                let previous = self.entries.insert(logical_path.to_string(), identity);
                previous.as_ref() != self.entries.get(logical_path)
            }
            None => self.entries.remove(logical_path).is_some(),
        }
    }

    /// Identity known for `logical_path`
    pub fn pending(&self, logical_path: &str) -> Option<&DocumentId> {
        self.entries.get(logical_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DocumentId)> {
        self.entries.iter().map(|(path, id)| (path.as_str(), id))
    }

    /// Track a document the user interacted with
    ///
    /// Stores its identity if the frontmatter has one, otherwise clears
    /// whatever was tracked for its path.
    pub fn on_menu_opened<V: DocumentStore>(
        &mut self,
        vault: &V,
        doc: &Path,
    ) -> SyncResult<Option<DocumentId>> {
        let info = vault.describe(doc)?;
        let identity = vault.read_metadata(doc)?.identity;

        if self.record(&info.logical_path, identity.clone()) {
            debug!("Tracking {} as {:?}", info.logical_path, identity);
            self.save()?;
        }
        Ok(identity)
    }

    /// Retire the remote revision of a deleted document
    ///
    /// The entry is dropped before the remote call, so it is gone even
    /// when marking the revision fails.
    pub async fn on_deleted<C, V, F>(
        &mut self,
        client: &C,
        vault: &V,
        doc: &Path,
        credentials: F,
    ) -> SyncResult<TombstoneOutcome>
    where
        C: SessionService + RemoteStore,
        V: DocumentStore,
        F: FnOnce() -> SyncResult<Credentials>,
    {
        let info = vault.describe(doc)?;
        let Some(identity) = self.entries.remove(&info.logical_path) else {
            debug!("Deleted {} was not tracked", info.logical_path);
            return Ok(TombstoneOutcome::Untracked);
        };
        self.save()?;

        ensure_session(client, credentials).await?;
        match client.mark_removed(&identity).await {
            Ok(()) => {
                info!("Marked {} ({}) as removed", info.logical_path, identity);
                Ok(TombstoneOutcome::Removed(identity))
            }
            Err(RemoteError::NotFound) => {
                warn!("{} ({}) was never published", info.logical_path, identity);
                Ok(TombstoneOutcome::NeverPublished(identity))
            }
            Err(e) => Err(SyncError::remote("mark removed", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentState, Revision, User};
    use crate::remote::{MemoryRemote, RemoteCall};
    use crate::vault::FsVault;
    use std::fs;
    use tempfile::TempDir;

    fn no_credentials() -> SyncResult<Credentials> {
        Err(SyncError::Configuration("unused".to_string()))
    }

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            email: None,
        }
    }

    fn revision(identity: &DocumentId, version: u64) -> Revision {
        Revision {
            identity: identity.clone(),
            version,
            path: String::new(),
            name: "a".to_string(),
            state: DocumentState::Published,
            content: String::new(),
        }
    }

    #[test]
    fn test_record_and_forget() {
        let mut tracker = TombstoneTracker::new();
        let id = DocumentId::mint();
        assert!(tracker.record("a.md", Some(id.clone())));
        assert!(!tracker.record("a.md", Some(id.clone())));
        assert_eq!(tracker.pending("a.md"), Some(&id));
        assert!(tracker.record("a.md", Some(DocumentId::from("other"))));
        assert!(tracker.record("a.md", None));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tombstones.json");
        let id = DocumentId::from("abc");

        let mut tracker = TombstoneTracker::with_path(&path).unwrap();
        tracker.record("posts/a.md", Some(id.clone()));
        tracker.save().unwrap();

        let reloaded = TombstoneTracker::with_path(&path).unwrap();
        assert_eq!(reloaded.pending("posts/a.md"), Some(&id));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_menu_opened_reads_identity() {
        let vault_dir = TempDir::new().unwrap();
        fs::write(
            vault_dir.path().join("a.md"),
            "---\nuuid: abc\nversion: 2\n---\n",
        )
        .unwrap();
        fs::write(vault_dir.path().join("b.md"), "no frontmatter").unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let id = DocumentId::from("abc");

        let mut tracker = TombstoneTracker::new();
        assert_eq!(
            tracker.on_menu_opened(&vault, Path::new("a.md")).unwrap(),
            Some(id.clone())
        );
        assert_eq!(tracker.on_menu_opened(&vault, Path::new("b.md")).unwrap(), None);
        assert_eq!(tracker.pending("a.md"), Some(&id));
        assert_eq!(tracker.pending("b.md"), None);
    }

    #[tokio::test]
    async fn test_deleted_untracked_makes_no_call() {
        let vault_dir = TempDir::new().unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let remote = MemoryRemote::new().with_session(user());

        let mut tracker = TombstoneTracker::new();
        let outcome = tracker
            .on_deleted(&remote, &vault, Path::new("gone.md"), no_credentials)
            .await
            .unwrap();
        assert_eq!(outcome, TombstoneOutcome::Untracked);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_marks_latest_revision() {
        let vault_dir = TempDir::new().unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let id = DocumentId::mint();
        let remote = MemoryRemote::new()
            .with_session(user())
            .with_site("blog", "user-1")
            .with_revision(revision(&id, 1), "blog", "user-1")
            .with_revision(revision(&id, 2), "blog", "user-1");

        let mut tracker = TombstoneTracker::new();
        tracker.record("a.md", Some(id.clone()));
        let outcome = tracker
            .on_deleted(&remote, &vault, Path::new("a.md"), no_credentials)
            .await
            .unwrap();

        assert_eq!(outcome, TombstoneOutcome::Removed(id.clone()));
        assert!(tracker.is_empty());
        let marks: Vec<_> = remote
            .calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::MarkRemoved(_)))
            .collect();
        assert_eq!(marks, vec![RemoteCall::MarkRemoved(id)]);
        assert_eq!(remote.revisions()[1].revision.state, DocumentState::Removed);
    }

    #[tokio::test]
    async fn test_failed_session_still_clears_entry() {
        let vault_dir = TempDir::new().unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let remote = MemoryRemote::new();

        let mut tracker = TombstoneTracker::new();
        tracker.record("a.md", Some(DocumentId::mint()));
        let result = tracker
            .on_deleted(&remote, &vault, Path::new("a.md"), no_credentials)
            .await;
        assert!(result.is_err());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_failed_mark_removed_still_clears_entry() {
        let vault_dir = TempDir::new().unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let path = vault_dir.path().join(".vellum").join("tombstones.json");
        let id = DocumentId::from("abc");
        let remote = MemoryRemote::new()
            .with_session(user())
            .with_site("blog", "user-1")
            .with_revision(revision(&id, 1), "blog", "user-1");
        remote.fail_mark_removed();

        let mut tracker = TombstoneTracker::with_path(&path).unwrap();
        tracker.record("a.md", Some(id.clone()));
        tracker.save().unwrap();

        let result = tracker
            .on_deleted(&remote, &vault, Path::new("a.md"), no_credentials)
            .await;
        assert!(matches!(
            result,
            Err(SyncError::Remote {
                operation: "mark removed",
                ..
            })
        ));
        assert!(tracker.is_empty());
        assert!(TombstoneTracker::with_path(&path).unwrap().is_empty());
        assert!(remote.calls().contains(&RemoteCall::MarkRemoved(id)));
        assert_eq!(remote.revisions()[0].revision.state, DocumentState::Published);
    }

    #[tokio::test]
    async fn test_unpublished_identity() {
        let vault_dir = TempDir::new().unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let remote = MemoryRemote::new().with_session(user());
        let id = DocumentId::mint();

        let mut tracker = TombstoneTracker::new();
        tracker.record("a.md", Some(id.clone()));
        let outcome = tracker
            .on_deleted(&remote, &vault, Path::new("a.md"), no_credentials)
            .await
            .unwrap();
        assert_eq!(outcome, TombstoneOutcome::NeverPublished(id));
    }
}
