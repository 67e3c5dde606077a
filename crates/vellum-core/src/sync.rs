//! Push pipeline
//!
//! One push moves a document through these stages:
//!
//! ```text
//! Idle -> SessionEnsured -> NamespaceChecked -> [InteractiveCreate]
//!      -> IdentityAssigned -> ContentLoaded -> ResourcesProcessed
//!      -> RevisionPersisted -> Done
//! ```
//!
//! Everything before `IdentityAssigned` is read-only, so a cancelled or
//! failed gate leaves the document untouched. The metadata rewrite happens
//! before the content is read, so the stored revision carries its own
//! identity and version. Embedded resources are processed one at a time
//! and a failing resource never aborts the push.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::gate::{self, GateOutcome, Prompt};
use crate::models::{DocumentId, Revision, User};
use crate::remote::{RemoteStore, SessionService};
use crate::resource::{push_resource, ResourceOutcome};
use crate::session::{ensure_session, Credentials};
use crate::vault::{DocumentInfo, DocumentStore};

/// Where a push currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    SessionEnsured,
    NamespaceChecked,
    InteractiveCreate,
    IdentityAssigned,
    ContentLoaded,
    ResourcesProcessed,
    RevisionPersisted,
    Done,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Idle => "idle",
            SyncStage::SessionEnsured => "session ensured",
            SyncStage::NamespaceChecked => "site checked",
            SyncStage::InteractiveCreate => "site created",
            SyncStage::IdentityAssigned => "identity assigned",
            SyncStage::ContentLoaded => "content loaded",
            SyncStage::ResourcesProcessed => "resources processed",
            SyncStage::RevisionPersisted => "revision stored",
            SyncStage::Done => "done",
        };
        f.write_str(name)
    }
}

struct Progress<'d> {
    document: &'d str,
    stage: SyncStage,
}

impl<'d> Progress<'d> {
    fn new(document: &'d str) -> Self {
        Self {
            document,
            stage: SyncStage::Idle,
        }
    }

    fn advance(&mut self, stage: SyncStage) {
        debug!("{}: {} -> {}", self.document, self.stage, stage);
        self.stage = stage;
    }
}

/// Summary of a completed push
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Vault-relative path of the pushed document
    pub document: String,
    pub identity: DocumentId,
    pub version: u64,
    /// A new identity was minted by this push
    pub is_new: bool,
    pub site: String,
    /// The site was created during this push
    pub created_site: bool,
    pub resources: Vec<ResourceOutcome>,
}

impl SyncReport {
    pub fn uploaded(&self) -> usize {
        self.resources.iter().filter(|r| r.is_upload()).count()
    }

    pub fn failed(&self) -> usize {
        self.resources.iter().filter(|r| r.is_failure()).count()
    }
}

/// How a push ended, short of an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Done(SyncReport),
    /// The target site was missing and its creation was declined
    Cancelled { site: String },
}

/// Make sure a site exists without pushing anything
pub async fn ensure_site<C, P, F>(
    client: &C,
    prompt: &P,
    credentials: F,
    slug: &str,
) -> SyncResult<GateOutcome>
where
    C: SessionService + RemoteStore,
    P: Prompt,
    F: FnOnce() -> SyncResult<Credentials>,
{
    let user = ensure_session(client, credentials).await?;
    gate::ensure(client, prompt, slug, &user).await
}

/// Pushes documents from a vault to a remote store
pub struct Syncer<'a, C, V, P> {
    client: &'a C,
    vault: &'a V,
    prompt: &'a P,
    config: &'a Config,
}

impl<'a, C, V, P> Syncer<'a, C, V, P>
where
    C: SessionService + RemoteStore,
    V: DocumentStore,
    P: Prompt,
{
    pub fn new(client: &'a C, vault: &'a V, prompt: &'a P, config: &'a Config) -> Self {
        Self {
            client,
            vault,
            prompt,
            config,
        }
    }

    /// Push one document and the resources it embeds
    pub async fn push(&self, doc: &Path) -> SyncResult<SyncOutcome> {
        let info = self.vault.describe(doc)?;
        let mut progress = Progress::new(&info.logical_path);

        let result = self.run(doc, &info, &mut progress).await;
        match result {
            Ok(SyncOutcome::Done(ref report)) => {
                progress.advance(SyncStage::Done);
                info!(
                    "Pushed {} as version {} of {} to '{}'",
                    report.document, report.version, report.identity, report.site
                );
            }
            Ok(SyncOutcome::Cancelled { ref site }) => {
                info!("Push of {} cancelled: site '{}' not created", info.logical_path, site);
            }
            Err(ref e) => {
                warn!("Push of {} failed after {}: {}", info.logical_path, progress.stage, e);
            }
        }
        result
    }

    async fn run(
        &self,
        doc: &Path,
        info: &DocumentInfo,
        progress: &mut Progress<'_>,
    ) -> SyncResult<SyncOutcome> {
        let metadata = self.vault.read_metadata(doc)?;
        let site = self.config.target_site(metadata.site.as_deref())?;

        let user = ensure_session(self.client, || self.config.credentials()).await?;
        progress.advance(SyncStage::SessionEnsured);

        match gate::ensure(self.client, self.prompt, &site, &user).await? {
            GateOutcome::Proceed { created: false } => {
                progress.advance(SyncStage::NamespaceChecked);
                self.resume(doc, info, site, &user, false, progress).await
            }
            GateOutcome::Proceed { created: true } => {
                progress.advance(SyncStage::InteractiveCreate);
                self.resume(doc, info, site, &user, true, progress).await
            }
            GateOutcome::Cancelled => Ok(SyncOutcome::Cancelled { site }),
        }
    }

    /// Everything after the gate: assign, load, upload, store
    async fn resume(
        &self,
        doc: &Path,
        info: &DocumentInfo,
        site: String,
        user: &User,
        created_site: bool,
        progress: &mut Progress<'_>,
    ) -> SyncResult<SyncOutcome> {
        // Re-read in case the document changed while the prompt was open
        let mut metadata = self.vault.read_metadata(doc)?;
        let assignment = metadata.assign_next_version();
        self.vault.write_metadata(doc, &metadata)?;
        progress.advance(SyncStage::IdentityAssigned);

        let content = self.vault.read_content(doc)?;
        progress.advance(SyncStage::ContentLoaded);

        let mut resources = Vec::new();
        for reference in self.vault.embeds(doc)? {
            let outcome = push_resource(self.client, self.vault, doc, &site, &reference).await;
            debug!("{}: {}", info.logical_path, outcome);
            resources.push(outcome);
        }
        progress.advance(SyncStage::ResourcesProcessed);

        let revision = Revision {
            identity: assignment.identity.clone(),
            version: assignment.version,
            path: info.path.clone(),
            name: info.name.clone(),
            state: assignment.state,
            content,
        };
        self.client
            .insert_revision(&revision, &site, user)
            .await
            .map_err(|e| SyncError::remote("insert revision", e))?;
        progress.advance(SyncStage::RevisionPersisted);

        Ok(SyncOutcome::Done(SyncReport {
            document: info.logical_path.clone(),
            identity: assignment.identity,
            version: assignment.version,
            is_new: assignment.is_new,
            site,
            created_site,
            resources,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::FixedAnswer;
    use crate::remote::{MemoryRemote, RemoteCall};
    use crate::vault::FsVault;
    use std::fs;
    use tempfile::TempDir;

    fn config(default_site: Option<&str>) -> Config {
        Config {
            email: Some("me@example.com".to_string()),
            password: Some("secret".to_string()),
            default_site: default_site.map(str::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(SyncStage::IdentityAssigned.to_string(), "identity assigned");
    }

    #[tokio::test]
    async fn test_frontmatter_site_overrides_default() {
        let vault_dir = TempDir::new().unwrap();
        fs::write(vault_dir.path().join("a.md"), "---\nsite: docs\n---\nbody").unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let remote = MemoryRemote::new()
            .with_account("me@example.com", "secret", "user-1")
            .with_site("docs", "user-1");
        let config = config(Some("blog"));
        let prompt = FixedAnswer(false);

        let syncer = Syncer::new(&remote, &vault, &prompt, &config);
        let SyncOutcome::Done(report) = syncer.push(Path::new("a.md")).await.unwrap() else {
            panic!("push was cancelled");
        };
        assert_eq!(report.site, "docs");
        assert_eq!(remote.revisions()[0].site, "docs");
    }

    #[tokio::test]
    async fn test_insert_failure_is_fatal() {
        let vault_dir = TempDir::new().unwrap();
        fs::write(vault_dir.path().join("a.md"), "body").unwrap();
        let vault = FsVault::new(vault_dir.path()).unwrap();
        let remote = MemoryRemote::new()
            .with_account("me@example.com", "secret", "user-1")
            .with_site("blog", "user-1");
        remote.fail_inserts();
        let config = config(Some("blog"));
        let prompt = FixedAnswer(true);

        let syncer = Syncer::new(&remote, &vault, &prompt, &config);
        let err = syncer.push(Path::new("a.md")).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Remote {
                operation: "insert revision",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ensure_site_creates_on_confirm() {
        let remote = MemoryRemote::new().with_account("me@example.com", "secret", "user-1");
        let config = config(None);

        let outcome = ensure_site(&remote, &FixedAnswer(true), || config.credentials(), "docs")
            .await
            .unwrap();
        assert_eq!(outcome, GateOutcome::Proceed { created: true });
        assert!(remote
            .calls()
            .contains(&RemoteCall::CreateSite("docs".to_string())));
    }
}
