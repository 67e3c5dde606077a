//! End-to-end push scenarios against the in-memory remote

use std::fs;
use std::path::Path;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use vellum_core::remote::RemoteCall;
use vellum_core::resource::object_key;
use vellum_core::{
    content_address, Config, DocumentId, DocumentState, DocumentStore, FixedAnswer, FsVault, MemoryRemote,
    ResourceOutcome, ResourceRecord, Revision, SyncError, SyncOutcome, SyncReport, Syncer,
    TombstoneOutcome, TombstoneTracker,
};

const EMAIL: &str = "me@example.com";
const PASSWORD: &str = "secret";
const USER_ID: &str = "user-1";

struct Fixture {
    _dir: TempDir,
    vault: FsVault,
    config: Config,
}

impl Fixture {
    fn new(default_site: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let vault = FsVault::new(dir.path()).unwrap();
        let config = Config {
            email: Some(EMAIL.to_string()),
            password: Some(PASSWORD.to_string()),
            default_site: Some(default_site.to_string()),
            vault_dir: dir.path().to_path_buf(),
            data_dir: dir.path().join(".vellum"),
            ..Config::default()
        };
        Self {
            _dir: dir,
            vault,
            config,
        }
    }

    fn write(&self, path: &str, content: &str) {
        let full = self.vault.root().join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn read(&self, path: &str) -> String {
        fs::read_to_string(self.vault.root().join(path)).unwrap()
    }

    async fn push(&self, remote: &MemoryRemote, answer: bool, doc: &str) -> SyncOutcome {
        let prompt = FixedAnswer(answer);
        Syncer::new(remote, &self.vault, &prompt, &self.config)
            .push(Path::new(doc))
            .await
            .unwrap()
    }
}

fn remote_with_blog() -> MemoryRemote {
    MemoryRemote::new()
        .with_account(EMAIL, PASSWORD, USER_ID)
        .with_site("blog", USER_ID)
}

fn done(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Done(report) => report,
        SyncOutcome::Cancelled { site } => panic!("push cancelled for site {site}"),
    }
}

fn inserts(remote: &MemoryRemote) -> usize {
    remote
        .calls()
        .iter()
        .filter(|c| matches!(c, RemoteCall::InsertRevision { .. }))
        .count()
}

#[tokio::test]
async fn fresh_document_gets_identity_and_version_one() {
    let fixture = Fixture::new("blog");
    fixture.write("hello.md", "# Hello");
    let remote = remote_with_blog();

    let report = done(fixture.push(&remote, false, "hello.md").await);

    assert!(report.is_new);
    assert_eq!(report.version, 1);
    assert!(!report.identity.as_str().is_empty());

    let metadata = fixture.vault.read_metadata(Path::new("hello.md")).unwrap();
    assert_eq!(metadata.identity.as_ref(), Some(&report.identity));
    assert_eq!(metadata.version, Some(1));

    let rows = remote.revisions();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].revision.identity, report.identity);
    assert_eq!(rows[0].revision.version, 1);
    assert_eq!(rows[0].revision.state, DocumentState::Published);
    assert_eq!(rows[0].revision.name, "hello");
    assert_eq!(rows[0].revision.path, "");
    assert_eq!(rows[0].site, "blog");
    assert_eq!(rows[0].author, USER_ID);

    // Stored content is the file after the metadata rewrite, body intact
    assert_eq!(rows[0].revision.content, fixture.read("hello.md"));
    assert!(rows[0].revision.content.ends_with("---\n# Hello"));
    assert!(rows[0].revision.content.contains(&report.identity.to_string()));
}

#[tokio::test]
async fn existing_identity_gets_next_version_and_keeps_old_row() {
    let fixture = Fixture::new("blog");
    let id = DocumentId::from("abc");
    fixture.write(
        "posts/abc.md",
        "---\ntitle: ABC\nuuid: abc\nversion: 3\n---\nNew body\n",
    );
    let old_row = Revision {
        identity: id.clone(),
        version: 3,
        path: "posts/".to_string(),
        name: "abc".to_string(),
        state: DocumentState::Published,
        content: "Old body".to_string(),
    };
    let remote = remote_with_blog().with_revision(old_row.clone(), "blog", USER_ID);

    let report = done(fixture.push(&remote, false, "posts/abc.md").await);

    assert!(!report.is_new);
    assert_eq!((report.identity.as_str(), report.version), ("abc", 4));

    let metadata = fixture.vault.read_metadata(Path::new("posts/abc.md")).unwrap();
    assert_eq!(metadata.identity, Some(id.clone()));
    assert_eq!(metadata.version, Some(4));
    assert_eq!(
        fixture.read("posts/abc.md"),
        "---\ntitle: ABC\nuuid: abc\nversion: 4\n---\nNew body\n"
    );

    let rows = remote.revisions();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].revision, old_row);
    assert_eq!(rows[1].revision.identity, id);
    assert_eq!(rows[1].revision.version, 4);
    assert_eq!(rows[1].revision.path, "posts/");
}

#[tokio::test]
async fn confirmed_site_creation_resumes_push() {
    let fixture = Fixture::new("new-site");
    fixture.write("a.md", "body");
    let remote = MemoryRemote::new().with_account(EMAIL, PASSWORD, USER_ID);

    let report = done(fixture.push(&remote, true, "a.md").await);

    assert!(report.created_site);
    assert_eq!(report.site, "new-site");
    let sites = remote.sites();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].slug, "new-site");
    assert_eq!(sites[0].owner.as_deref(), Some(USER_ID));
    assert_eq!(remote.revisions()[0].site, "new-site");

    // Resumed, not restarted: one lookup, one create, one insert
    let calls = remote.calls();
    let lookups = calls
        .iter()
        .filter(|c| matches!(c, RemoteCall::FindSite(_)))
        .count();
    assert_eq!(lookups, 1);
    assert_eq!(inserts(&remote), 1);
}

#[tokio::test]
async fn cancelled_site_creation_writes_nothing() {
    let fixture = Fixture::new("new-site");
    fixture.write("a.md", "untouched");
    let remote = MemoryRemote::new().with_account(EMAIL, PASSWORD, USER_ID);

    let outcome = fixture.push(&remote, false, "a.md").await;

    assert_eq!(
        outcome,
        SyncOutcome::Cancelled {
            site: "new-site".to_string()
        }
    );
    assert!(remote.sites().is_empty());
    assert!(remote.revisions().is_empty());
    assert_eq!(inserts(&remote), 0);
    assert_eq!(fixture.read("a.md"), "untouched");
}

#[tokio::test]
async fn missing_site_is_configuration_error_without_remote_calls() {
    let mut fixture = Fixture::new("blog");
    fixture.config.default_site = Some("   ".to_string());
    fixture.write("a.md", "body");
    let remote = remote_with_blog();
    let prompt = FixedAnswer(true);

    let result = Syncer::new(&remote, &fixture.vault, &prompt, &fixture.config)
        .push(Path::new("a.md"))
        .await;

    assert!(matches!(result, Err(SyncError::Configuration(_))));
    assert!(remote.calls().is_empty());
    assert_eq!(fixture.read("a.md"), "body");
}

#[tokio::test]
async fn malformed_frontmatter_aborts_before_network() {
    let fixture = Fixture::new("blog");
    fixture.write("a.md", "---\ntitle: [unclosed\n---\nbody");
    let remote = remote_with_blog();

    let prompt = FixedAnswer(true);
    let result = Syncer::new(&remote, &fixture.vault, &prompt, &fixture.config)
        .push(Path::new("a.md"))
        .await;

    assert!(matches!(result, Err(SyncError::Metadata { .. })));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn wrong_password_is_authentication_error() {
    let mut fixture = Fixture::new("blog");
    fixture.config.password = Some("wrong".to_string());
    fixture.write("a.md", "body");
    let remote = remote_with_blog();

    let prompt = FixedAnswer(true);
    let result = Syncer::new(&remote, &fixture.vault, &prompt, &fixture.config)
        .push(Path::new("a.md"))
        .await;

    assert!(matches!(result, Err(SyncError::Authentication(_))));
    assert!(remote.revisions().is_empty());
}

#[tokio::test]
async fn embedded_resources_follow_dedup_law() {
    let fixture = Fixture::new("blog");
    fixture.write(
        "posts/a.md",
        "![[new.png]]\n![[stale.png]]\n![fresh](img/fresh.png)\n![[new.png]]\n![[nowhere.png]]\n![[Other]]\n",
    );
    fixture.write("posts/new.png", "new");
    fixture.write("stale.png", "stale");
    fixture.write("posts/img/fresh.png", "fresh");
    fixture.write("Other.md", "another document");

    let long_ago = Utc::now() - Duration::days(365);
    let far_future = Utc::now() + Duration::days(365);
    let record = |path: &str, last_modified| ResourceRecord {
        path_hash: content_address(path),
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap().to_string(),
        last_modified,
    };
    let remote = remote_with_blog()
        .with_resource(record("stale.png", long_ago))
        .with_resource(record("posts/img/fresh.png", far_future));

    let report = done(fixture.push(&remote, false, "posts/a.md").await);

    assert_eq!(
        report.resources,
        vec![
            ResourceOutcome::Uploaded {
                path: "posts/new.png".to_string(),
                replaced: false
            },
            ResourceOutcome::Uploaded {
                path: "stale.png".to_string(),
                replaced: true
            },
            ResourceOutcome::UpToDate {
                path: "posts/img/fresh.png".to_string()
            },
            ResourceOutcome::Missing {
                reference: "nowhere.png".to_string()
            },
            ResourceOutcome::Document {
                path: "Other.md".to_string()
            },
        ]
    );
    assert_eq!(report.uploaded(), 2);
    assert_eq!(
        remote.object_keys(),
        vec!["blog/posts/new.png".to_string(), "blog/stale.png".to_string()]
    );
    let (bytes, content_type) = remote.object(&object_key("blog", "posts/new.png")).unwrap();
    assert_eq!(bytes, b"new");
    assert_eq!(content_type, "image/png");

    let stale = remote
        .resources()
        .into_iter()
        .find(|r| r.path == "stale.png")
        .unwrap();
    assert!(stale.last_modified > long_ago);

    // A second push finds everything up to date
    let report = done(fixture.push(&remote, false, "posts/a.md").await);
    assert_eq!(report.uploaded(), 0);
    assert_eq!(report.version, 2);
}

#[tokio::test]
async fn failing_resource_does_not_abort_push() {
    let fixture = Fixture::new("blog");
    fixture.write("a.md", "![[bad.png]] ![[good.png]] ![[unknown.png]]");
    fixture.write("bad.png", "bad");
    fixture.write("good.png", "good");
    fixture.write("unknown.png", "unknown");
    let remote = remote_with_blog();
    remote.fail_upload(&object_key("blog", "bad.png"));
    remote.fail_lookup(&content_address("unknown.png"));

    let report = done(fixture.push(&remote, false, "a.md").await);

    assert_eq!(report.failed(), 2);
    assert!(report.resources[0].is_failure());
    assert!(report.resources[1].is_upload());
    assert!(report.resources[2].is_failure());
    assert_eq!(remote.revisions().len(), 1);

    // The failed upload left no record behind, so the next push retries it
    assert!(remote
        .resources()
        .iter()
        .all(|r| r.path_hash != content_address("bad.png")));
}

#[tokio::test]
async fn dry_run_vault_leaves_files_alone() {
    let fixture = Fixture::new("blog");
    fixture.write("a.md", "# Draft");
    let vault = FsVault::dry_run(fixture.vault.root()).unwrap();
    let remote = remote_with_blog();
    let prompt = FixedAnswer(false);

    let outcome = Syncer::new(&remote, &vault, &prompt, &fixture.config)
        .push(Path::new("a.md"))
        .await
        .unwrap();

    let report = done(outcome);
    assert_eq!(report.version, 1);
    assert_eq!(fixture.read("a.md"), "# Draft");
    assert!(remote.revisions()[0].revision.content.contains("version: 1"));
}

#[tokio::test]
async fn tombstone_after_push_and_delete() {
    let fixture = Fixture::new("blog");
    fixture.write("notes/gone.md", "bye");
    let remote = remote_with_blog();
    let report = done(fixture.push(&remote, false, "notes/gone.md").await);

    let mut tracker = TombstoneTracker::with_path(fixture.config.tombstones_path()).unwrap();
    let seen = tracker
        .on_menu_opened(&fixture.vault, Path::new("notes/gone.md"))
        .unwrap();
    assert_eq!(seen.as_ref(), Some(&report.identity));

    fs::remove_file(fixture.vault.root().join("notes/gone.md")).unwrap();

    // A later run picks the identity up from disk
    let mut tracker = TombstoneTracker::with_path(fixture.config.tombstones_path()).unwrap();
    let credentials = || fixture.config.credentials();
    let outcome = tracker
        .on_deleted(&remote, &fixture.vault, Path::new("notes/gone.md"), credentials)
        .await
        .unwrap();

    assert_eq!(outcome, TombstoneOutcome::Removed(report.identity.clone()));
    assert!(tracker.is_empty());
    assert_eq!(remote.revisions()[0].revision.state, DocumentState::Removed);
    let marks = remote
        .calls()
        .into_iter()
        .filter(|c| matches!(c, RemoteCall::MarkRemoved(_)))
        .count();
    assert_eq!(marks, 1);

    // Deleting again is a no-op
    let before = remote.calls().len();
    let outcome = tracker
        .on_deleted(&remote, &fixture.vault, Path::new("notes/gone.md"), || {
            fixture.config.credentials()
        })
        .await
        .unwrap();
    assert_eq!(outcome, TombstoneOutcome::Untracked);
    assert_eq!(remote.calls().len(), before);
}

#[tokio::test]
async fn tracking_other_documents_keeps_each_identity() {
    let fixture = Fixture::new("blog");
    fixture.write("a.md", "a");
    fixture.write("b.md", "b");
    let remote = remote_with_blog();
    let a = done(fixture.push(&remote, false, "a.md").await).identity;
    let b = done(fixture.push(&remote, false, "b.md").await).identity;

    let mut tracker = TombstoneTracker::new();
    tracker.on_menu_opened(&fixture.vault, Path::new("a.md")).unwrap();
    tracker.on_menu_opened(&fixture.vault, Path::new("b.md")).unwrap();
    fs::remove_file(fixture.vault.root().join("a.md")).unwrap();

    let outcome = tracker
        .on_deleted(&remote, &fixture.vault, Path::new("a.md"), || {
            fixture.config.credentials()
        })
        .await
        .unwrap();

    assert_eq!(outcome, TombstoneOutcome::Removed(a));
    assert_eq!(tracker.pending("b.md"), Some(&b));
}
