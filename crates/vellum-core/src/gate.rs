//! Site gate
//!
//! A revision can only be written to a site that exists. When it does not,
//! the user is asked whether to create it. Declining cancels the operation
//! without an error.

use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::models::{Site, User};
use crate::remote::RemoteStore;

/// Asks the user to confirm an action
#[allow(async_fn_in_trait)]
pub trait Prompt {
    /// Ask whether the missing site `slug` should be created
    async fn confirm_create_site(&self, slug: &str) -> bool;
}

/// A prompt that always gives the same answer
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompt for FixedAnswer {
    async fn confirm_create_site(&self, slug: &str) -> bool {
        debug!("Answering {} for site '{}'", self.0, slug);
        self.0
    }
}

/// Whether a site exists remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceStatus {
    Exists(Site),
    Missing,
}

/// Result of passing the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The site exists; `created` when it was created just now
    Proceed { created: bool },
    /// The user declined to create the site
    Cancelled,
}

/// Prompt text shown when a site is missing
pub fn missing_site_question(slug: &str) -> String {
    format!(
        "The site \"{}\" does not exist. Would you like to create it?",
        slug
    )
}

/// Look the site up
pub async fn check<R: RemoteStore>(remote: &R, slug: &str) -> SyncResult<NamespaceStatus> {
    let site = remote
        .find_site(slug)
        .await
        .map_err(|e| SyncError::remote("site lookup", e))?;
    Ok(match site {
        Some(site) => NamespaceStatus::Exists(site),
        None => NamespaceStatus::Missing,
    })
}

/// Make sure the site exists, creating it if the user agrees
pub async fn ensure<R, P>(remote: &R, prompt: &P, slug: &str, owner: &User) -> SyncResult<GateOutcome>
where
    R: RemoteStore,
    P: Prompt,
{
    if let NamespaceStatus::Exists(_) = check(remote, slug).await? {
        debug!("Site '{}' exists", slug);
        return Ok(GateOutcome::Proceed { created: false });
    }

    debug!("Site '{}' is missing, asking to create it", slug);
    if !prompt.confirm_create_site(slug).await {
        info!("Creation of site '{}' declined", slug);
        return Ok(GateOutcome::Cancelled);
    }

    remote
        .create_site(slug, owner)
        .await
        .map_err(|e| SyncError::remote("create site", e))?;
    info!("Created site '{}'", slug);
    Ok(GateOutcome::Proceed { created: true })
}
