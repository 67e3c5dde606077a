//! In-memory remote
//!
//! Mirrors the remote tables (sites, documents, resources) and the object
//! bucket in process memory, and records every call it receives. Failures
//! can be injected per object key or resource hash.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{RemoteStore, SessionService};
use crate::error::RemoteError;
use crate::models::{DocumentId, DocumentState, ResourceRecord, Revision, Site, User};

/// A call received by [`MemoryRemote`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    SignIn(String),
    CurrentUser,
    SignOut,
    FindSite(String),
    CreateSite(String),
    InsertRevision { identity: DocumentId, version: u64 },
    MarkRemoved(DocumentId),
    FindResource(String),
    UpsertResource(String),
    UploadObject(String),
}

/// A stored revision row with its site link and author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRevision {
    pub revision: Revision,
    pub site: String,
    pub author: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, (String, User)>,
    session: Option<User>,
    sites: Vec<Site>,
    revisions: Vec<StoredRevision>,
    resources: HashMap<String, ResourceRecord>,
    objects: BTreeMap<String, (Vec<u8>, String)>,
    calls: Vec<RemoteCall>,
    failing_uploads: HashSet<String>,
    failing_lookups: HashSet<String>,
    fail_inserts: bool,
    fail_mark_removed: bool,
}

/// Remote store and session service backed by process memory
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account that can sign in
    pub fn with_account(self, email: &str, password: &str, user_id: &str) -> Self {
        self.lock().accounts.insert(
            email.to_string(),
            (
                password.to_string(),
                User {
                    id: user_id.to_string(),
                    email: Some(email.to_string()),
                },
            ),
        );
        self
    }

    /// Start with an active session for `user`
    pub fn with_session(self, user: User) -> Self {
        self.lock().session = Some(user);
        self
    }

    /// Start with an existing site
    pub fn with_site(self, slug: &str, owner: &str) -> Self {
        self.lock().sites.push(Site {
            slug: slug.to_string(),
            name: Some(slug.to_string()),
            owner: Some(owner.to_string()),
        });
        self
    }

    /// Start with an existing revision row
    pub fn with_revision(self, revision: Revision, site: &str, author: &str) -> Self {
        self.lock().revisions.push(StoredRevision {
            revision,
            site: site.to_string(),
            author: author.to_string(),
        });
        self
    }

    /// Start with an existing resource record
    pub fn with_resource(self, record: ResourceRecord) -> Self {
        self.lock()
            .resources
            .insert(record.path_hash.clone(), record);
        self
    }

    /// Make uploads to `key` fail
    pub fn fail_upload(&self, key: &str) {
        self.lock().failing_uploads.insert(key.to_string());
    }

    /// Make lookups of `path_hash` fail with a server error
    pub fn fail_lookup(&self, path_hash: &str) {
        self.lock().failing_lookups.insert(path_hash.to_string());
    }

    /// Make revision inserts fail
    pub fn fail_inserts(&self) {
        self.lock().fail_inserts = true;
    }

    /// Make marking revisions removed fail
    pub fn fail_mark_removed(&self) {
        self.lock().fail_mark_removed = true;
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn sites(&self) -> Vec<Site> {
        self.lock().sites.clone()
    }

    pub fn revisions(&self) -> Vec<StoredRevision> {
        self.lock().revisions.clone()
    }

    pub fn resources(&self) -> Vec<ResourceRecord> {
        self.lock().resources.values().cloned().collect()
    }

    /// Stored object bytes and content type
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.lock().objects.get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: RemoteCall) -> MutexGuard<'_, MemoryState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

fn server_error(message: &str) -> RemoteError {
    RemoteError::Api {
        status: 500,
        code: None,
        message: message.to_string(),
    }
}

impl SessionService for MemoryRemote {
    async fn has_active_session(&self) -> bool {
        self.lock().session.is_some()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, RemoteError> {
        let mut state = self.record(RemoteCall::SignIn(email.to_string()));
        let user = match state.accounts.get(email) {
            Some((expected, user)) if expected == password => user.clone(),
            _ => {
                return Err(RemoteError::Unauthorized(
                    "Invalid login credentials".to_string(),
                ))
            }
        };
        state.session = Some(user.clone());
        Ok(user)
    }

    async fn current_user(&self) -> Result<Option<User>, RemoteError> {
        let state = self.record(RemoteCall::CurrentUser);
        Ok(state.session.clone())
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.record(RemoteCall::SignOut).session = None;
        Ok(())
    }
}

impl RemoteStore for MemoryRemote {
    async fn find_site(&self, slug: &str) -> Result<Option<Site>, RemoteError> {
        let state = self.record(RemoteCall::FindSite(slug.to_string()));
        Ok(state.sites.iter().find(|s| s.slug == slug).cloned())
    }

    async fn create_site(&self, slug: &str, owner: &User) -> Result<Site, RemoteError> {
        let mut state = self.record(RemoteCall::CreateSite(slug.to_string()));
        if state.sites.iter().any(|s| s.slug == slug) {
            return Err(RemoteError::Api {
                status: 409,
                code: Some("23505".to_string()),
                message: format!("duplicate key value violates unique constraint: {}", slug),
            });
        }
        let site = Site {
            slug: slug.to_string(),
            name: Some(slug.to_string()),
            owner: Some(owner.id.clone()),
        };
        state.sites.push(site.clone());
        Ok(site)
    }

    async fn insert_revision(
        &self,
        revision: &Revision,
        site: &str,
        author: &User,
    ) -> Result<(), RemoteError> {
        let mut state = self.record(RemoteCall::InsertRevision {
            identity: revision.identity.clone(),
            version: revision.version,
        });
        if state.fail_inserts {
            return Err(server_error("insert failed"));
        }
        if !state.sites.iter().any(|s| s.slug == site) {
            return Err(RemoteError::Api {
                status: 400,
                code: Some("P0001".to_string()),
                message: format!("site '{}' does not exist", site),
            });
        }
        state.revisions.push(StoredRevision {
            revision: revision.clone(),
            site: site.to_string(),
            author: author.id.clone(),
        });
        Ok(())
    }

    async fn mark_removed(&self, identity: &DocumentId) -> Result<(), RemoteError> {
        let mut state = self.record(RemoteCall::MarkRemoved(identity.clone()));
        if state.fail_mark_removed {
            return Err(server_error("update failed"));
        }
        let latest = state
            .revisions
            .iter_mut()
            .filter(|r| &r.revision.identity == identity)
            .max_by_key(|r| r.revision.version)
            .ok_or(RemoteError::NotFound)?;
        latest.revision.state = DocumentState::Removed;
        Ok(())
    }

    async fn find_resource(&self, path_hash: &str) -> Result<Option<ResourceRecord>, RemoteError> {
        let state = self.record(RemoteCall::FindResource(path_hash.to_string()));
        if state.failing_lookups.contains(path_hash) {
            return Err(server_error("lookup failed"));
        }
        Ok(state.resources.get(path_hash).cloned())
    }

    async fn upsert_resource(&self, record: &ResourceRecord) -> Result<(), RemoteError> {
        let mut state = self.record(RemoteCall::UpsertResource(record.path_hash.clone()));
        state
            .resources
            .insert(record.path_hash.clone(), record.clone());
        Ok(())
    }

    async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        let mut state = self.record(RemoteCall::UploadObject(key.to_string()));
        if state.failing_uploads.contains(key) {
            return Err(server_error("upload failed"));
        }
        state
            .objects
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }
}
