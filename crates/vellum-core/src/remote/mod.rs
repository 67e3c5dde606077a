//! Remote store and session service
//!
//! The push pipeline talks to the remote side through two traits:
//!
//! - [`SessionService`]: sign-in state of the current user
//! - [`RemoteStore`]: sites, append-only document revisions, resource
//!   records and object storage
//!
//! [`SupabaseClient`] implements both over HTTP. [`MemoryRemote`] keeps
//! everything in memory and backs the tests and `push --dry-run`.

mod memory;
mod supabase;

pub use memory::{MemoryRemote, RemoteCall, StoredRevision};
pub use supabase::{AuthSession, SupabaseClient};

use crate::error::RemoteError;
use crate::models::{DocumentId, ResourceRecord, Revision, Site, User};

/// Authentication state of the remote project
#[allow(async_fn_in_trait)]
pub trait SessionService {
    /// Whether a usable session exists right now
    ///
    /// Failures while checking count as "no session".
    async fn has_active_session(&self) -> bool;

    /// Sign in with email and password, replacing any current session
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, RemoteError>;

    /// The user behind the current session
    async fn current_user(&self) -> Result<Option<User>, RemoteError>;

    /// Drop the current session
    async fn sign_out(&self) -> Result<(), RemoteError>;
}

/// Relational and object storage operations used by the push pipeline
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Look up a site by slug
    async fn find_site(&self, slug: &str) -> Result<Option<Site>, RemoteError>;

    /// Create a site owned by `owner`
    async fn create_site(&self, slug: &str, owner: &User) -> Result<Site, RemoteError>;

    /// Insert a new revision row and link it to the site in one transaction
    ///
    /// Never updates an existing row.
    async fn insert_revision(
        &self,
        revision: &Revision,
        site: &str,
        author: &User,
    ) -> Result<(), RemoteError>;

    /// Flag the latest revision of `identity` as removed
    ///
    /// Returns `RemoteError::NotFound` when the identity has no revision.
    async fn mark_removed(&self, identity: &DocumentId) -> Result<(), RemoteError>;

    /// Look up a resource record by content address
    async fn find_resource(&self, path_hash: &str) -> Result<Option<ResourceRecord>, RemoteError>;

    /// Create or replace the resource record for `record.path_hash`
    async fn upsert_resource(&self, record: &ResourceRecord) -> Result<(), RemoteError>;

    /// Store bytes under `key`, overwriting an existing object
    async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), RemoteError>;
}

/// Turns the "no matching row" sentinel into an empty lookup result
pub trait LookupExt<T> {
    fn found(self) -> Result<Option<T>, RemoteError>;
}

impl<T> LookupExt<T> for Result<T, RemoteError> {
    fn found(self) -> Result<Option<T>, RemoteError> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(RemoteError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
