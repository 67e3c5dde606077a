//! Vellum Core Library
//!
//! This crate provides the core functionality for Vellum, which publishes
//! Markdown documents from a local vault, along with the media they embed,
//! to a site hosted on a Supabase project.
//!
//! # Architecture
//!
//! - **Frontmatter identity**: each document carries a stable `uuid` and a
//!   `version` that moves up by one on every push
//! - **Append-only revisions**: a push always inserts a new remote row
//! - **Path-addressed resources**: embeds are uploaded only when missing or
//!   newer than the remote record
//! - **Site gate**: writes target an existing site, created on request
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let client = SupabaseClient::new(config.remote_settings()?)?
//!     .with_session_path(config.session_path())?;
//! let vault = FsVault::new(&config.vault_dir)?;
//!
//! let syncer = Syncer::new(&client, &vault, &FixedAnswer(true), &config);
//! let outcome = syncer.push(Path::new("posts/hello.md")).await?;
//! ```
//!
//! # Modules
//!
//! - `sync`: The push pipeline (main entry point)
//! - `metadata`: Frontmatter parsing and version assignment
//! - `resource`: Embedded resource deduplication and upload
//! - `gate`: Site existence check and interactive creation
//! - `tombstone`: Retiring remote revisions of deleted documents
//! - `remote`: Remote store traits, Supabase client, in-memory store
//! - `vault`: Local document store
//! - `config`: Application configuration

pub mod config;
pub mod error;
pub mod gate;
pub mod hasher;
pub mod metadata;
pub mod models;
pub mod persist;
pub mod remote;
pub mod resource;
pub mod session;
pub mod sync;
pub mod tombstone;
pub mod vault;

pub use config::{Config, RemoteSettings};
pub use error::{RemoteError, SyncError, SyncResult};
pub use gate::{FixedAnswer, GateOutcome, NamespaceStatus, Prompt};
pub use hasher::content_address;
pub use metadata::{Assignment, Metadata};
pub use models::{DocumentId, DocumentState, ResourceRecord, Revision, Site, User};
pub use remote::{MemoryRemote, RemoteStore, SessionService, SupabaseClient};
pub use resource::ResourceOutcome;
pub use session::{ensure_session, Credentials};
pub use sync::{ensure_site, SyncOutcome, SyncReport, SyncStage, Syncer};
pub use tombstone::{TombstoneOutcome, TombstoneTracker};
pub use vault::{DocumentStore, FsVault};
