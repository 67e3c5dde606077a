//! Document frontmatter and version assignment
//!
//! Every pushed document carries its identity in a YAML frontmatter block:
//!
//! ```text
//! ---
//! uuid: 1f0c3b0e-5d0a-4a53-9a53-3c4b8f2f6d10
//! version: 4
//! state: published
//! site: blog
//! ---
//! # Body
//! ```
//!
//! Keys other than `uuid`, `version`, `state` and `site` are kept as-is,
//! in their original order, when the block is written back.

use serde_yaml::{Mapping, Value};
use tracing::warn;

use crate::models::{DocumentId, DocumentState};

const IDENTITY_KEY: &str = "uuid";
const VERSION_KEY: &str = "version";
const STATE_KEY: &str = "state";
const SITE_KEY: &str = "site";

const DELIMITER: &str = "---";

/// Typed view of a document's frontmatter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub identity: Option<DocumentId>,
    pub version: Option<u64>,
    pub state: Option<DocumentState>,
    /// Per-document site, overriding the configured default
    pub site: Option<String>,
    raw: Mapping,
}

/// Identity and version chosen for the next revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub identity: DocumentId,
    pub version: u64,
    pub state: DocumentState,
    /// A fresh identity was minted for this push
    pub is_new: bool,
}

impl Metadata {
    /// Build the typed view from a parsed YAML mapping
    ///
    /// The identity is an opaque token and is kept as written. Other
    /// values of the wrong shape are treated as absent.
    pub fn from_mapping(raw: Mapping) -> Self {
        let identity = match raw.get(IDENTITY_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(DocumentId::from(s.trim())),
            Some(Value::Number(n)) => Some(DocumentId::from(n.to_string())),
            Some(other) if !other.is_null() && other.as_str().is_none() => {
                warn!("Ignoring frontmatter uuid that is not a scalar");
                None
            }
            _ => None,
        };

        let version = match raw.get(VERSION_KEY) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        if version.is_none() && raw.contains_key(VERSION_KEY) {
            warn!("Ignoring frontmatter version that is not a non-negative integer");
        }

        let state = match raw.get(STATE_KEY) {
            Some(Value::String(s)) => match s.parse() {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!("{}; treating document as published", e);
                    None
                }
            },
            _ => None,
        };

        let site = match raw.get(SITE_KEY) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        };

        Self {
            identity,
            version,
            state,
            site,
            raw,
        }
    }

    /// The mapping to write back, with typed fields applied
    pub fn to_mapping(&self) -> Mapping {
        let mut raw = self.raw.clone();
        if let Some(ref identity) = self.identity {
            raw.insert(IDENTITY_KEY.into(), Value::String(identity.to_string()));
        }
        if let Some(version) = self.version {
            raw.insert(VERSION_KEY.into(), Value::Number(version.into()));
        }
        if let Some(state) = self.state {
            raw.insert(STATE_KEY.into(), Value::String(state.as_str().to_string()));
        }
        if let Some(ref site) = self.site {
            raw.insert(SITE_KEY.into(), Value::String(site.clone()));
        }
        raw
    }

    /// Look up a key that has no typed field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Choose the identity and version for the next push and record them
    ///
    /// An existing identity keeps its value and the version moves up by
    /// one. Otherwise a new identity is minted at version 1.
    pub fn assign_next_version(&mut self) -> Assignment {
        let state = self.state.unwrap_or_default();
        match (&self.identity, self.version) {
            (Some(identity), Some(version)) => {
                let identity = identity.clone();
                let next = version.saturating_add(1);
                self.version = Some(next);
                Assignment {
                    identity,
                    version: next,
                    state,
                    is_new: false,
                }
            }
            _ => {
                let identity = DocumentId::mint();
                self.identity = Some(identity.clone());
                self.version = Some(1);
                Assignment {
                    identity,
                    version: 1,
                    state,
                    is_new: true,
                }
            }
        }
    }
}

/// Split a document into its frontmatter YAML and body
///
/// Returns `None` when the text does not open with a delimited block.
pub fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix(DELIMITER)?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Parse the frontmatter of a document
///
/// Documents without a frontmatter block yield empty metadata and the
/// whole text as body.
pub fn parse(text: &str) -> Result<(Metadata, &str), serde_yaml::Error> {
    let Some((yaml, body)) = split_frontmatter(text) else {
        return Ok((Metadata::default(), text));
    };

    let raw = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        _ => {
            return Err(serde::de::Error::custom(
                "frontmatter must be a mapping of keys to values",
            ))
        }
    };

    Ok((Metadata::from_mapping(raw), body))
}

/// Render a document from metadata and body
pub fn render(metadata: &Metadata, body: &str) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(&metadata.to_mapping())?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_frontmatter() {
        let text = "---\ntitle: Hello\n---\n# Body\n";
        let (yaml, body) = split_frontmatter(text).unwrap();
        assert_eq!(yaml, "title: Hello\n");
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn test_split_requires_opening_delimiter() {
        assert!(split_frontmatter("# Just a heading\n---\n").is_none());
        assert!(split_frontmatter("---\nunterminated: true\n").is_none());
    }

    #[test]
    fn test_split_crlf() {
        let (yaml, body) = split_frontmatter("---\r\na: 1\r\n---\r\nbody").unwrap();
        assert_eq!(yaml, "a: 1\r\n");
        assert_eq!(body, "body");
    }

    #[test]
    fn test_no_frontmatter_mints_identity() {
        let (mut metadata, body) = parse("# Hello").unwrap();
        assert_eq!(body, "# Hello");

        let assignment = metadata.assign_next_version();
        assert!(assignment.is_new);
        assert_eq!(assignment.version, 1);
        assert_eq!(assignment.state, DocumentState::Published);
        assert_eq!(metadata.identity.as_ref(), Some(&assignment.identity));
        assert!(!assignment.identity.as_str().is_empty());
    }

    #[test]
    fn test_existing_identity_increments_version() {
        let id = DocumentId::mint();
        let text = format!("---\nuuid: {id}\nversion: 3\n---\nbody");
        let (mut metadata, _) = parse(&text).unwrap();

        let assignment = metadata.assign_next_version();
        assert!(!assignment.is_new);
        assert_eq!(assignment.identity, id);
        assert_eq!(assignment.version, 4);
        assert_eq!(metadata.version, Some(4));
    }

    #[test]
    fn test_identity_without_version_is_reminted() {
        let id = DocumentId::mint();
        let (mut metadata, _) = parse(&format!("---\nuuid: {id}\n---\n")).unwrap();

        let assignment = metadata.assign_next_version();
        assert!(assignment.is_new);
        assert_ne!(assignment.identity, id);
        assert_eq!(assignment.version, 1);
    }

    #[test]
    fn test_opaque_identity_is_kept() {
        let (mut metadata, body) = parse("---\nuuid: abc\nversion: 3\n---\nbody").unwrap();
        assert_eq!(metadata.identity, Some(DocumentId::from("abc")));

        let assignment = metadata.assign_next_version();
        assert!(!assignment.is_new);
        assert_eq!(assignment.identity.as_str(), "abc");
        assert_eq!(assignment.version, 4);

        let rendered = render(&metadata, body).unwrap();
        assert_eq!(rendered, "---\nuuid: abc\nversion: 4\n---\nbody");
    }

    #[test]
    fn test_numeric_identity_is_kept() {
        let (metadata, _) = parse("---\nuuid: 42\nversion: 1\n---\n").unwrap();
        assert_eq!(metadata.identity, Some(DocumentId::from("42")));
    }

    #[test]
    fn test_blank_identity_is_absent() {
        let (metadata, _) = parse("---\nuuid: \"  \"\nversion: 2\n---\n").unwrap();
        assert!(metadata.identity.is_none());
        assert_eq!(metadata.version, Some(2));
    }

    #[test]
    fn test_state_carried_through() {
        let id = DocumentId::mint();
        let text = format!("---\nuuid: {id}\nversion: 1\nstate: removed\n---\n");
        let (mut metadata, _) = parse(&text).unwrap();
        assert_eq!(metadata.assign_next_version().state, DocumentState::Removed);
    }

    #[test]
    fn test_render_preserves_other_keys_in_order() {
        let text = "---\ntitle: Hello\ntags:\n  - a\n  - b\nsite: blog\n---\n# Body\n";
        let (mut metadata, body) = parse(text).unwrap();
        assert_eq!(metadata.site.as_deref(), Some("blog"));
        metadata.assign_next_version();

        let rendered = render(&metadata, body).unwrap();
        assert!(rendered.starts_with("---\ntitle: Hello\n"));
        assert!(rendered.ends_with("---\n# Body\n"));

        let (reparsed, reparsed_body) = parse(&rendered).unwrap();
        assert_eq!(reparsed.identity, metadata.identity);
        assert_eq!(reparsed.version, Some(1));
        assert_eq!(reparsed_body, "# Body\n");
        assert_eq!(
            reparsed.get("tags"),
            Some(&Value::Sequence(vec!["a".into(), "b".into()]))
        );

        let title_at = rendered.find("title:").unwrap();
        let uuid_at = rendered.find("uuid:").unwrap();
        assert!(title_at < uuid_at);
    }

    #[test]
    fn test_state_not_written_when_absent() {
        let (mut metadata, body) = parse("plain").unwrap();
        metadata.assign_next_version();
        let rendered = render(&metadata, body).unwrap();
        assert!(!rendered.contains("state:"));
        assert!(rendered.ends_with("---\nplain"));
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        assert!(parse("---\ntitle: \"unclosed\n---\nbody").is_err());
        assert!(parse("---\n- a\n- b\n---\nbody").is_err());
    }

    #[test]
    fn test_empty_frontmatter() {
        let (metadata, body) = parse("---\n---\nbody").unwrap();
        assert_eq!(metadata, Metadata::default());
        assert_eq!(body, "body");
    }
}
