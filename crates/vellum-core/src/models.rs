//! Data models for Vellum
//!
//! Rows exchanged with the remote store: document revisions, sites,
//! resource records and the signed-in user.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publication state of a document revision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentState {
    #[default]
    Published,
    Removed,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Published => "published",
            DocumentState::Removed => "removed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "published" => Ok(DocumentState::Published),
            "removed" => Ok(DocumentState::Removed),
            other => Err(format!("unknown document state '{}'", other)),
        }
    }
}

/// Stable identity shared by every revision of a document
///
/// New documents get a random UUID, but whatever token a document already
/// carries in its frontmatter is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Mint a fresh random identity
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// One immutable stored copy of a document at a specific version
///
/// Serialized with the column names of the `documents` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Stable identity shared by every revision of the document
    #[serde(rename = "id")]
    pub identity: DocumentId,
    pub version: u64,
    /// Folder of the document inside the vault, with a trailing `/`
    pub path: String,
    /// File stem of the document
    pub name: String,
    pub state: DocumentState,
    pub content: String,
}

/// A tenant-scoped container documents and resources belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub slug: String,
    #[serde(default)]
    pub name: Option<String>,
    /// User id of the creator
    #[serde(rename = "created_by", default)]
    pub owner: Option<String>,
}

/// Remote record of an uploaded resource, keyed by `path_hash`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub path_hash: String,
    pub path: String,
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// The authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}
