//! # Resource Paths
//!
//! Collections and documents are named by absolute, slash-separated paths:
//!
//! ```text
//! /db                      collection, depth 1
//! /db/books                collection, depth 2
//! /db/books/moby-dick.xml  document,   depth 3, parent /db/books
//! ```
//!
//! A `ResourcePath` is always normalized: it starts with `/`, has at least one
//! segment, no empty, `.` or `..` segments, and no trailing slash. Two spellings
//! of the same resource (`/db/a/` and `/db/a`) therefore lock the same entry.
//!
//! Ancestor-before-descendant acquisition order is the caller's contract;
//! `is_ancestor_of` exists so callers and tests can check it.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn parse(raw: &str) -> Result<Self> {
        Self::normalize(raw).map_err(|reason| Error::InvalidPath {
            path: raw.to_string(),
            reason,
        })
    }

    /// Normalizes `raw`, returning the reason it is malformed on failure.
    pub(crate) fn normalize(raw: &str) -> std::result::Result<Self, &'static str> {
        if raw.is_empty() {
            return Err("empty path");
        }
        if !raw.starts_with('/') {
            return Err("path must be absolute");
        }
        if raw.contains('\0') {
            return Err("path contains a NUL byte");
        }

        let trimmed = raw.strip_suffix('/').unwrap_or(raw);
        if trimmed.is_empty() {
            return Err("path has no segments");
        }

        for segment in trimmed[1..].split('/') {
            match segment {
                "" => return Err("empty path segment"),
                "." | ".." => return Err("relative path segment"),
                _ => {}
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// The final segment.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(at) => &self.0[at + 1..],
            None => &self.0,
        }
    }

    /// The enclosing collection, or `None` for a top-level path.
    pub fn parent(&self) -> Option<ResourcePath> {
        let at = self.0.rfind('/')?;
        if at == 0 {
            return None;
        }
        Some(Self(self.0[..at].to_string()))
    }

    pub fn child(&self, name: &str) -> Result<ResourcePath> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::InvalidPath {
                path: format!("{}/{}", self.0, name),
                reason: "child name must be a single segment",
            });
        }
        Self::parse(&format!("{}/{}", self.0, name))
    }

    /// True if `other` is strictly nested below `self`.
    pub fn is_ancestor_of(&self, other: &ResourcePath) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0.as_bytes()[self.0.len()] == b'/'
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourcePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
