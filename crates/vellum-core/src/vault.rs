//! Local document store
//!
//! A vault is a directory of Markdown documents and the media files they
//! embed. [`DocumentStore`] is what the push pipeline needs from it;
//! [`FsVault`] implements it on the local file system.
//!
//! Documents are addressed by path. Relative paths are taken relative to
//! the vault root, and paths outside the vault are rejected.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::metadata::{self, Metadata};
use crate::persist;

const MARKDOWN_EXTENSION: &str = "md";

/// Where a document sits inside the vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Folder relative to the vault root with a trailing `/`, empty at the root
    pub path: String,
    /// File stem
    pub name: String,
    /// Vault-relative path of the file, `/` separated
    pub logical_path: String,
}

/// An embedded file found in the vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    /// Vault-relative path, `/` separated
    pub logical_path: String,
    /// File name with extension
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub location: PathBuf,
}

impl LocalResource {
    /// Whether the embed points at another document rather than media
    pub fn is_document(&self) -> bool {
        is_markdown(&self.location)
    }
}

/// Access to documents and their embedded resources
pub trait DocumentStore {
    /// Folder, name and vault-relative path of a document
    ///
    /// Works for documents that no longer exist on disk.
    fn describe(&self, doc: &Path) -> SyncResult<DocumentInfo>;

    /// Parse the document's frontmatter
    fn read_metadata(&self, doc: &Path) -> SyncResult<Metadata>;

    /// Rewrite the document's frontmatter, keeping its body
    fn write_metadata(&self, doc: &Path, metadata: &Metadata) -> SyncResult<()>;

    /// Full text of the document, frontmatter included
    fn read_content(&self, doc: &Path) -> SyncResult<String>;

    /// References embedded in the document body, in first-occurrence order
    fn embeds(&self, doc: &Path) -> SyncResult<Vec<String>>;

    /// Find the file an embed reference points at
    fn resolve(&self, doc: &Path, reference: &str) -> SyncResult<Option<LocalResource>>;

    /// Bytes of a resolved resource
    fn read_resource(&self, resource: &LocalResource) -> SyncResult<Vec<u8>>;
}

/// A vault rooted at a directory on disk
#[derive(Debug)]
pub struct FsVault {
    root: PathBuf,
    /// Documents rewritten during a dry run, kept in memory only
    overlay: Option<Mutex<HashMap<PathBuf, String>>>,
}

impl FsVault {
    /// Open the vault at `root`
    pub fn new(root: impl AsRef<Path>) -> SyncResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| SyncError::io(root, e))?;
        if !root.is_dir() {
            return Err(SyncError::Configuration(format!(
                "Vault directory {:?} is not a directory",
                root
            )));
        }
        Ok(Self {
            root,
            overlay: None,
        })
    }

    /// Open the vault without ever writing to it
    ///
    /// Metadata rewrites are kept in memory and seen by later reads.
    pub fn dry_run(root: impl AsRef<Path>) -> SyncResult<Self> {
        let mut vault = Self::new(root)?;
        vault.overlay = Some(Mutex::new(HashMap::new()));
        Ok(vault)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every Markdown document in the vault, sorted by path
    pub fn documents(&self) -> SyncResult<Vec<PathBuf>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|path| is_markdown(path))
            .collect())
    }

    /// Vault-relative, `/` separated path of a file inside the vault
    pub fn logical_path(&self, doc: &Path) -> SyncResult<String> {
        let location = self.locate(doc)?;
        Ok(self.relative(&location))
    }

    /// Absolute location of `doc`, rejecting paths outside the vault
    fn locate(&self, doc: &Path) -> SyncResult<PathBuf> {
        let joined = if doc.is_absolute() {
            doc.to_path_buf()
        } else {
            self.root.join(doc)
        };

        // The file may be gone (deletions), so canonicalize the folder only
        let location = match (joined.parent(), joined.file_name()) {
            (Some(parent), Some(name)) => match parent.canonicalize() {
                Ok(parent) => parent.join(name),
                Err(_) => normalize(&joined),
            },
            _ => normalize(&joined),
        };

        if !location.starts_with(&self.root) || location == self.root {
            return Err(SyncError::Configuration(format!(
                "{:?} is not a file inside the vault {:?}",
                doc, self.root
            )));
        }
        Ok(location)
    }

    fn relative(&self, location: &Path) -> String {
        let relative = location.strip_prefix(&self.root).unwrap_or(location);
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    fn overlay(&self) -> Option<MutexGuard<'_, HashMap<PathBuf, String>>> {
        self.overlay
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn read_text(&self, location: &Path) -> SyncResult<String> {
        if let Some(overlay) = self.overlay() {
            if let Some(text) = overlay.get(location) {
                return Ok(text.clone());
            }
        }
        fs::read_to_string(location).map_err(|e| SyncError::io(location, e))
    }

    fn parse_metadata<'t>(&self, location: &Path, text: &'t str) -> SyncResult<(Metadata, &'t str)> {
        metadata::parse(text).map_err(|e| SyncError::Metadata {
            path: location.to_path_buf(),
            details: e.to_string(),
        })
    }

    /// All files in the vault, sorted, skipping hidden entries
    fn files(&self) -> SyncResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        walk(&self.root, &mut files).map_err(|e| SyncError::io(&self.root, e))?;
        files.sort();
        Ok(files)
    }

    fn candidate(&self, location: PathBuf) -> Option<PathBuf> {
        let location = location.canonicalize().ok()?;
        (location.is_file() && location.starts_with(&self.root)).then_some(location)
    }

    fn to_resource(&self, location: PathBuf) -> SyncResult<LocalResource> {
        let modified = fs::metadata(&location)
            .and_then(|m| m.modified())
            .map_err(|e| SyncError::io(&location, e))?;
        let name = location
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(LocalResource {
            logical_path: self.relative(&location),
            name,
            last_modified: to_millis(modified.into()),
            location,
        })
    }
}

impl DocumentStore for FsVault {
    fn describe(&self, doc: &Path) -> SyncResult<DocumentInfo> {
        let location = self.locate(doc)?;
        let logical_path = self.relative(&location);
        let path = match logical_path.rfind('/') {
            Some(i) => logical_path[..=i].to_string(),
            None => String::new(),
        };
        let name = location
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DocumentInfo {
            path,
            name,
            logical_path,
        })
    }

    fn read_metadata(&self, doc: &Path) -> SyncResult<Metadata> {
        let location = self.locate(doc)?;
        let text = self.read_text(&location)?;
        let (metadata, _) = self.parse_metadata(&location, &text)?;
        Ok(metadata)
    }

    fn write_metadata(&self, doc: &Path, metadata: &Metadata) -> SyncResult<()> {
        let location = self.locate(doc)?;
        let text = self.read_text(&location)?;
        let (_, body) = self.parse_metadata(&location, &text)?;
        let rendered = metadata::render(metadata, body).map_err(|e| SyncError::Metadata {
            path: location.clone(),
            details: e.to_string(),
        })?;

        if let Some(mut overlay) = self.overlay() {
            debug!("Dry run: keeping metadata of {:?} in memory", location);
            overlay.insert(location, rendered);
            return Ok(());
        }
        persist::atomic_write(&location, rendered.as_bytes())
            .map_err(|e| SyncError::io(&location, e))
    }

    fn read_content(&self, doc: &Path) -> SyncResult<String> {
        let location = self.locate(doc)?;
        self.read_text(&location)
    }

    fn embeds(&self, doc: &Path) -> SyncResult<Vec<String>> {
        let location = self.locate(doc)?;
        let text = self.read_text(&location)?;
        let body = metadata::split_frontmatter(&text)
            .map(|(_, body)| body)
            .unwrap_or(&text);
        Ok(extract_embeds(body))
    }

    fn resolve(&self, doc: &Path, reference: &str) -> SyncResult<Option<LocalResource>> {
        let location = self.locate(doc)?;
        let reference = reference.trim_start_matches("./");
        if reference.is_empty() {
            return Ok(None);
        }

        // Wiki embeds may leave off the extension of a note
        let mut names = vec![reference.to_string()];
        if Path::new(reference).extension().is_none() {
            names.push(format!("{}.{}", reference, MARKDOWN_EXTENSION));
        }

        let folder = location.parent().unwrap_or(self.root.as_path());
        for base in [folder, self.root.as_path()] {
            for name in &names {
                if let Some(found) = self.candidate(base.join(name)) {
                    return self.to_resource(found).map(Some);
                }
            }
        }

        let wanted: Vec<&str> = names
            .iter()
            .filter_map(|n| Path::new(n).file_name().and_then(|f| f.to_str()))
            .collect();
        let by_name = self.files()?.into_iter().find(|path| {
            path.file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| wanted.contains(&f))
        });

        match by_name {
            Some(found) => self.to_resource(found).map(Some),
            None => Ok(None),
        }
    }

    fn read_resource(&self, resource: &LocalResource) -> SyncResult<Vec<u8>> {
        fs::read(&resource.location).map_err(|e| SyncError::io(&resource.location, e))
    }
}

/// Embedded references in Markdown text
///
/// Recognizes `![[target]]` (with optional `|alias` or `#heading`) and
/// `![alt](target)`. Remote URLs and `data:` URIs are skipped, encoded
/// paths are decoded, code spans and code blocks are ignored and
/// duplicates are dropped.
pub fn extract_embeds(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut embeds = Vec::new();
    let mut add = |reference: String| {
        if seen.insert(reference.clone()) {
            embeds.push(reference);
        }
    };

    // The parser splits literal text around brackets, so wiki embeds are
    // looked for in each run of consecutive text events
    let mut text_run = String::new();
    let mut in_code_block = false;

    for event in Parser::new(text) {
        if let Event::Text(ref chunk) = event {
            if !in_code_block {
                text_run.push_str(chunk);
            }
            continue;
        }

        wiki_targets(&text_run).into_iter().for_each(&mut add);
        text_run.clear();

        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Start(Tag::Image { dest_url, .. }) => {
                if let Some(target) = image_target(&dest_url) {
                    add(target);
                }
            }
            _ => {}
        }
    }
    wiki_targets(&text_run).into_iter().for_each(&mut add);

    embeds
}

/// Every `![[...]]` in a run of plain text
fn wiki_targets(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("![[") {
        let inner = &rest[start + 3..];
        let Some(end) = inner.find("]]") else {
            break;
        };
        found.extend(wiki_target(&inner[..end]));
        rest = &inner[end + 2..];
    }
    found
}

fn wiki_target(inner: &str) -> Option<String> {
    let target = inner.split('|').next().unwrap_or_default();
    let target = target.split('#').next().unwrap_or_default().trim();
    (!target.is_empty()).then(|| target.to_string())
}

fn image_target(dest_url: &str) -> Option<String> {
    let target = dest_url.trim();
    let lower = target.to_ascii_lowercase();
    if target.is_empty()
        || lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("data:")
    {
        return None;
    }
    Some(percent_decode(target))
}

/// Decode `%XX` escapes, leaving the input alone if it is not valid UTF-8 afterwards
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                decoded.push(value);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded).unwrap_or_else(|_| input.to_string())
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), files)?;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok(())
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
}

/// Drop `.` and resolve `..` without touching the file system
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Millisecond precision, matching what the remote stores
fn to_millis(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(time.timestamp_millis()).unwrap_or(time)
}
