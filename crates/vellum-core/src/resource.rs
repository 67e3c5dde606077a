//! Embedded resource deduplication
//!
//! A resource is identified remotely by the hash of its vault-relative
//! path. It is uploaded when no record exists for that hash, or when the
//! local file is newer than the recorded modification time.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{RemoteError, SyncError};
use crate::hasher::content_address;
use crate::models::ResourceRecord;
use crate::remote::RemoteStore;
use crate::vault::{DocumentStore, LocalResource};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Whether a resource is known remotely and needs to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDecision {
    pub path_hash: String,
    pub exists: bool,
    pub needs_upload: bool,
}

/// What happened to one embedded reference during a push
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResourceOutcome {
    /// Sent to object storage and recorded
    Uploaded { path: String, replaced: bool },
    /// Remote copy is at least as new as the local file
    UpToDate { path: String },
    /// No file in the vault matches the reference
    Missing { reference: String },
    /// The reference points at another document
    Document { path: String },
    /// Lookup, read or upload failed; the push went on without it
    Failed { path: String, error: String },
}

impl ResourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ResourceOutcome::Failed { .. })
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, ResourceOutcome::Uploaded { .. })
    }
}

impl fmt::Display for ResourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceOutcome::Uploaded {
                path,
                replaced: false,
            } => write!(f, "uploaded {}", path),
            ResourceOutcome::Uploaded {
                path,
                replaced: true,
            } => write!(f, "replaced {}", path),
            ResourceOutcome::UpToDate { path } => write!(f, "skipped {} (up to date)", path),
            ResourceOutcome::Missing { reference } => write!(f, "missing {}", reference),
            ResourceOutcome::Document { path } => write!(f, "skipped {} (document)", path),
            ResourceOutcome::Failed { path, error } => write!(f, "failed {}: {}", path, error),
        }
    }
}

/// Decide whether the resource at `logical_path` has to be uploaded
pub async fn decide<R: RemoteStore>(
    remote: &R,
    logical_path: &str,
    last_modified: DateTime<Utc>,
) -> Result<ResourceDecision, RemoteError> {
    let path_hash = content_address(logical_path);
    let record = remote.find_resource(&path_hash).await?;

    let (exists, needs_upload) = match record {
        None => (false, true),
        Some(record) => (true, record.last_modified < last_modified),
    };

    Ok(ResourceDecision {
        path_hash,
        exists,
        needs_upload,
    })
}

/// Object key of a resource inside the storage bucket
pub fn object_key(site: &str, logical_path: &str) -> String {
    format!("{}/{}", site, logical_path.trim_start_matches('/'))
}

/// MIME type guessed from the file extension
pub fn content_type_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

/// Upload one embedded reference if needed
///
/// Never fails the push: every error is captured in the outcome.
pub async fn push_resource<R, V>(
    remote: &R,
    vault: &V,
    doc: &Path,
    site: &str,
    reference: &str,
) -> ResourceOutcome
where
    R: RemoteStore,
    V: DocumentStore,
{
    let resource = match vault.resolve(doc, reference) {
        Ok(Some(resource)) => resource,
        Ok(None) => {
            warn!("Embedded resource not found in vault: {}", reference);
            return ResourceOutcome::Missing {
                reference: reference.to_string(),
            };
        }
        Err(e) => {
            warn!("Could not resolve {}: {}", reference, e);
            return ResourceOutcome::Failed {
                path: reference.to_string(),
                error: e.to_string(),
            };
        }
    };

    if resource.is_document() {
        debug!("Skipping embedded document {}", resource.logical_path);
        return ResourceOutcome::Document {
            path: resource.logical_path,
        };
    }

    match upload_if_needed(remote, vault, site, &resource).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Resource {} not uploaded: {}", resource.logical_path, e);
            ResourceOutcome::Failed {
                path: resource.logical_path,
                error: e.to_string(),
            }
        }
    }
}

async fn upload_if_needed<R, V>(
    remote: &R,
    vault: &V,
    site: &str,
    resource: &LocalResource,
) -> Result<ResourceOutcome, SyncError>
where
    R: RemoteStore,
    V: DocumentStore,
{
    let decision = decide(remote, &resource.logical_path, resource.last_modified)
        .await
        .map_err(|e| SyncError::remote("resource lookup", e))?;

    if !decision.needs_upload {
        debug!("Resource {} is up to date", resource.logical_path);
        return Ok(ResourceOutcome::UpToDate {
            path: resource.logical_path.clone(),
        });
    }

    let bytes = vault.read_resource(resource)?;
    let key = object_key(site, &resource.logical_path);
    remote
        .upload_object(&key, bytes, content_type_for(&resource.logical_path))
        .await
        .map_err(|e| SyncError::remote("upload", e))?;

    remote
        .upsert_resource(&ResourceRecord {
            path_hash: decision.path_hash,
            path: resource.logical_path.clone(),
            name: resource.name.clone(),
            last_modified: resource.last_modified,
        })
        .await
        .map_err(|e| SyncError::remote("resource record upsert", e))?;

    info!("Uploaded {} to {}", resource.logical_path, key);
    Ok(ResourceOutcome::Uploaded {
        path: resource.logical_path.clone(),
        replaced: decision.exists,
    })
}
