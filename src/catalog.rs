//! Version catalog lookup
//!
//! The catalog is the authority on which Python versions exist for a
//! given stack. `resolve_line` answers "latest patch for major.minor";
//! `supports` validates a fully-qualified request. Two implementations:
//! a compiled-in table for offline operation and tests, and an
//! HTTP-backed index for platforms that publish one.

use crate::error::{MoltError, MoltResult};
use crate::net;
use semver::Version;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Authority on available Python versions per stack
pub trait VersionCatalog: Send + Sync {
    /// Latest known patch release for `major.minor` on `stack`
    fn resolve_line(&self, major: u64, minor: u64, stack: &str) -> MoltResult<Version>;

    /// Whether a fully-qualified version exists for `stack`
    fn supports(&self, version: &Version, stack: &str) -> MoltResult<bool>;
}

fn latest_in_line(versions: &[Version], major: u64, minor: u64) -> Option<Version> {
    versions
        .iter()
        .filter(|v| v.major == major && v.minor == minor)
        .max()
        .cloned()
}

/// A 404 on the index means the stack has no published catalog; any
/// other download error is a real failure
fn index_missing(err: &MoltError) -> bool {
    matches!(
        err,
        MoltError::Download {
            status: Some(404),
            ..
        }
    )
}

fn not_found(requested: impl Into<String>, stack: &str) -> MoltError {
    MoltError::VersionNotFound {
        requested: requested.into(),
        stack: stack.to_string(),
    }
}

/// Compiled-in catalog of runtimes the platform ships
pub struct StaticCatalog {
    versions: Vec<Version>,
    stacks: Vec<String>,
}

impl StaticCatalog {
    /// Runtimes available on every supported stack
    const KNOWN_VERSIONS: &'static [&'static str] = &[
        "3.9.18",
        "3.9.21",
        "3.10.12",
        "3.10.16",
        "3.11.7",
        "3.11.9",
        "3.12.4",
        "3.12.7",
        "3.13.1",
        "3.13.2",
    ];

    const KNOWN_STACKS: &'static [&'static str] = &["ubuntu-22", "ubuntu-24"];

    pub fn new() -> Self {
        let versions = Self::KNOWN_VERSIONS
            .iter()
            .map(|s| Version::parse(s).expect("static catalog entries are valid"))
            .collect();
        let stacks = Self::KNOWN_STACKS.iter().map(|s| s.to_string()).collect();
        Self { versions, stacks }
    }

    fn check_stack(&self, requested: &str, stack: &str) -> MoltResult<()> {
        if self.stacks.iter().any(|s| s == stack) {
            Ok(())
        } else {
            Err(not_found(requested, stack))
        }
    }
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionCatalog for StaticCatalog {
    fn resolve_line(&self, major: u64, minor: u64, stack: &str) -> MoltResult<Version> {
        let line = format!("{}.{}", major, minor);
        self.check_stack(&line, stack)?;
        latest_in_line(&self.versions, major, minor).ok_or_else(|| not_found(line, stack))
    }

    fn supports(&self, version: &Version, stack: &str) -> MoltResult<bool> {
        self.check_stack(&version.to_string(), stack)?;
        Ok(self.versions.contains(version))
    }
}

/// Per-stack index document served by the platform
#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: Vec<String>,
}

/// Catalog backed by a per-stack JSON index over HTTP.
///
/// Index URL is `{base}/{stack}.json`. Fetches go through the bounded
/// retry in `net`; a 404 on the index means the stack is unknown and
/// surfaces as `VersionNotFound` rather than a download failure.
pub struct HttpCatalog {
    base_url: String,
    fetched: Mutex<HashMap<String, Vec<Version>>>,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetched: Mutex::new(HashMap::new()),
        }
    }

    fn index_url(&self, stack: &str) -> String {
        format!("{}/{}.json", self.base_url, stack)
    }

    /// Fetch (or reuse) the version list for a stack.
    ///
    /// Returns `Ok(None)` when the platform serves no index for the
    /// stack; the caller turns that into `VersionNotFound`.
    fn versions_for(&self, stack: &str) -> MoltResult<Option<Vec<Version>>> {
        {
            let fetched = self
                .fetched
                .lock()
                .map_err(|_| MoltError::Internal("catalog cache lock poisoned".to_string()))?;
            if let Some(cached) = fetched.get(stack) {
                return Ok(Some(cached.clone()));
            }
        }

        let url = self.index_url(stack);
        let body = match net::fetch_string(&url) {
            Ok(body) => body,
            Err(e) if index_missing(&e) => {
                debug!("No version index for stack {}", stack);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let index: VersionIndex = serde_json::from_str(&body)?;
        let mut versions = Vec::with_capacity(index.versions.len());
        for raw in &index.versions {
            match Version::parse(raw) {
                Ok(v) => versions.push(v),
                Err(e) => debug!("Skipping malformed catalog entry '{}': {}", raw, e),
            }
        }

        debug!("Fetched {} versions for stack {}", versions.len(), stack);
        self.fetched
            .lock()
            .map_err(|_| MoltError::Internal("catalog cache lock poisoned".to_string()))?
            .insert(stack.to_string(), versions.clone());
        Ok(Some(versions))
    }
}

impl VersionCatalog for HttpCatalog {
    fn resolve_line(&self, major: u64, minor: u64, stack: &str) -> MoltResult<Version> {
        let line = format!("{}.{}", major, minor);
        let versions = self
            .versions_for(stack)?
            .ok_or_else(|| not_found(line.clone(), stack))?;
        latest_in_line(&versions, major, minor).ok_or_else(|| not_found(line, stack))
    }

    fn supports(&self, version: &Version, stack: &str) -> MoltResult<bool> {
        let versions = self
            .versions_for(stack)?
            .ok_or_else(|| not_found(version.to_string(), stack))?;
        Ok(versions.contains(version))
    }
}
