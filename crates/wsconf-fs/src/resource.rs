//! URI based resource handling
//!
//! Every file the configuration service touches is addressed by a
//! [`Resource`]: local settings use the `file` scheme, remote settings use
//! whatever scheme the remote environment hands out, and tests use
//! `memory`. Windows separators are normalized to forward slashes before
//! parsing so the same string form is produced on every platform.

use std::fmt;
use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// A hierarchical URI such as `file:///home/me/project` or
/// `vscode-remote://ssh+box/home/me/.settings.json`.
///
/// Opaque URIs (`mailto:x`) are rejected at construction so path
/// manipulation is always possible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resource {
    url: Url,
}

impl Resource {
    /// Parse a URI string.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.replace('\\', "/");
        let url = Url::parse(&normalized).map_err(|e| Error::InvalidResource {
            input: input.to_string(),
            message: e.to_string(),
        })?;
        Self::from_url(url)
    }

    /// Build a `file` resource from a local path.
    ///
    /// Relative paths are made absolute through the current directory.
    pub fn from_file_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|e| Error::io(path, e))?;
            let joined = cwd.join(path);
            dunce::canonicalize(&joined).unwrap_or(joined)
        };
        let url = Url::from_file_path(&absolute).map_err(|()| Error::InvalidResource {
            input: absolute.display().to_string(),
            message: "not an absolute file path".to_string(),
        })?;
        Self::from_url(url)
    }

    fn from_url(url: Url) -> Result<Self> {
        if url.cannot_be_a_base() {
            return Err(Error::InvalidResource {
                input: url.to_string(),
                message: "opaque URIs are not supported".to_string(),
            });
        }
        Ok(Self { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host and port part, empty for local files.
    pub fn authority(&self) -> &str {
        self.url.authority()
    }

    /// The percent-encoded path component.
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Local path for `file` resources.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.url.scheme() != "file" {
            return None;
        }
        self.url.to_file_path().ok()
    }

    /// Append path segments (`a/b/c` style) to this resource.
    pub fn join(&self, relative: &str) -> Self {
        let mut url = self.url.clone();
        // Construction guarantees a hierarchical URI, so this always succeeds.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            for segment in relative.replace('\\', "/").split('/') {
                if !segment.is_empty() {
                    segments.push(segment);
                }
            }
        }
        Self { url }
    }

    /// Resolve a reference the way a relative link is resolved against this
    /// resource (`../x`, `x`, `/abs`, or a full URI).
    pub fn resolve(&self, reference: &str) -> Result<Self> {
        let normalized = reference.replace('\\', "/");
        let url = self
            .url
            .join(&normalized)
            .map_err(|e| Error::InvalidResource {
                input: reference.to_string(),
                message: e.to_string(),
            })?;
        Self::from_url(url)
    }

    /// The containing resource, `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.url.path().trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().pop();
        }
        Some(Self { url })
    }

    /// The decoded last path segment.
    pub fn file_name(&self) -> Option<String> {
        let last = self
            .url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()?;
        Some(percent_decode_str(last).decode_utf8_lossy().into_owned())
    }

    /// File name without its final extension.
    pub fn file_stem(&self) -> Option<String> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(idx) if idx > 0 => Some(name[..idx].to_string()),
            _ => Some(name),
        }
    }

    /// Path of `child` relative to this resource, when `child` lives below it.
    pub fn relative_path_to(&self, child: &Resource) -> Option<String> {
        if self.scheme() != child.scheme() || self.authority() != child.authority() {
            return None;
        }
        let base = self.url.path().trim_end_matches('/');
        let rest = child.url.path().strip_prefix(base)?.strip_prefix('/')?;
        Some(percent_decode_str(rest).decode_utf8_lossy().into_owned())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

impl std::str::FromStr for Resource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Resource {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Resource> for String {
    fn from(resource: Resource) -> Self {
        resource.url.into()
    }
}

/// How two resources are compared for identity.
///
/// File systems decide whether `A.txt` and `a.txt` are the same file; the
/// provider of a scheme reports which rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceIdentity {
    #[default]
    CaseSensitive,
    CaseInsensitive,
}

impl ResourceIdentity {
    /// Comparison key: scheme, authority and path without a trailing slash.
    pub fn key(&self, resource: &Resource) -> String {
        let path = resource.path();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        let key = format!("{}://{}{}", resource.scheme(), resource.authority(), path);
        match self {
            Self::CaseSensitive => key,
            Self::CaseInsensitive => key.to_lowercase(),
        }
    }

    pub fn is_equal(&self, a: &Resource, b: &Resource) -> bool {
        self.key(a) == self.key(b)
    }

    /// `candidate` is `parent` itself or lives somewhere below it.
    pub fn is_equal_or_parent(&self, parent: &Resource, candidate: &Resource) -> bool {
        let parent_key = self.key(parent);
        let candidate_key = self.key(candidate);
        candidate_key == parent_key
            || candidate_key
                .strip_prefix(parent_key.trim_end_matches('/'))
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
