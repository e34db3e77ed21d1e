//! Python version resolution
//!
//! Determines which runtime version a build wants and where that wish
//! came from, then pins it to a fully-qualified version through the
//! catalog. The fallback chain, first match wins:
//!
//! 1. `.python-version` in the source tree (preferred declaration)
//! 2. `runtime.txt` (legacy declaration, still honored)
//! 3. the previous build's recorded version, reduced to its line
//!    (sticky default so builds never jump lines silently)
//! 4. the hardcoded platform default

use crate::catalog::VersionCatalog;
use crate::error::{MoltError, MoltResult};
use semver::Version;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Version used when nothing requests one and no prior build exists
pub const DEFAULT_PYTHON_VERSION: &str = "3.13.2";

/// Preferred declaration file
pub const VERSION_FILE: &str = ".python-version";

/// Legacy declaration file, format `python-X.Y.Z`
pub const LEGACY_VERSION_FILE: &str = "runtime.txt";

/// Where the requested version came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrigin {
    /// `.python-version` in the source tree
    ExplicitFile,
    /// `runtime.txt` in the source tree
    DeprecatedFile,
    /// Line carried over from the previous build's full version
    CachedMajor,
    /// Hardcoded platform default
    Default,
}

impl fmt::Display for VersionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExplicitFile => "explicit-file",
            Self::DeprecatedFile => "deprecated-file",
            Self::CachedMajor => "cached-major",
            Self::Default => "default",
        };
        write!(f, "{}", name)
    }
}

/// The requested version, its origin, and the pinned resolution.
/// Created once per build, immutable afterwards.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    /// Raw requested string, possibly a bare line like "3.12"
    pub requested: String,
    /// Which fallback step produced the request
    pub origin: VersionOrigin,
    /// Fully-qualified version validated against the catalog
    pub resolved: Version,
}

/// A parsed version requirement
enum Request {
    Exact(Version),
    Line { major: u64, minor: u64 },
}

fn parse_request(raw: &str, source_name: &str) -> MoltResult<Request> {
    // The legacy file spells versions as `python-3.12.7`
    let value = raw.trim().trim_start_matches("python-");

    let invalid = |reason: &str| MoltError::VersionRequestInvalid {
        value: raw.trim().to_string(),
        source_name: source_name.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = value.split('.').collect();
    match parts.len() {
        2 => {
            let major = parts[0].parse().map_err(|_| invalid("major is not a number"))?;
            let minor = parts[1].parse().map_err(|_| invalid("minor is not a number"))?;
            Ok(Request::Line { major, minor })
        }
        3 => {
            let version =
                Version::parse(value).map_err(|_| invalid("expected major.minor.patch"))?;
            Ok(Request::Exact(version))
        }
        _ => Err(invalid("expected major.minor or major.minor.patch")),
    }
}

/// First meaningful line of a declaration file
fn read_declaration(path: &Path) -> MoltResult<Option<String>> {
    let content = fs::read_to_string(path)
        .map_err(|e| MoltError::io(format!("reading {}", path.display()), e))?;

    Ok(content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from))
}

/// Determine the requested version string and its origin.
fn requested_version(
    source_dir: &Path,
    prior_full: Option<&str>,
) -> MoltResult<(String, VersionOrigin)> {
    let version_file = source_dir.join(VERSION_FILE);
    if version_file.is_file() {
        let raw = read_declaration(&version_file)?.ok_or(MoltError::VersionRequestInvalid {
            value: String::new(),
            source_name: VERSION_FILE.to_string(),
            reason: "file is empty".to_string(),
        })?;
        return Ok((raw, VersionOrigin::ExplicitFile));
    }

    let legacy_file = source_dir.join(LEGACY_VERSION_FILE);
    if legacy_file.is_file() {
        let raw = read_declaration(&legacy_file)?.ok_or(MoltError::VersionRequestInvalid {
            value: String::new(),
            source_name: LEGACY_VERSION_FILE.to_string(),
            reason: "file is empty".to_string(),
        })?;
        warn!(
            "{} is deprecated, declare the version in {} instead",
            LEGACY_VERSION_FILE, VERSION_FILE
        );
        return Ok((raw, VersionOrigin::DeprecatedFile));
    }

    if let Some(prior) = prior_full {
        match Version::parse(prior) {
            Ok(v) => {
                let line = format!("{}.{}", v.major, v.minor);
                debug!("No version file, sticking to previous line {}", line);
                return Ok((line, VersionOrigin::CachedMajor));
            }
            Err(e) => {
                debug!("Ignoring unparseable prior version '{}': {}", prior, e);
            }
        }
    }

    Ok((
        DEFAULT_PYTHON_VERSION.to_string(),
        VersionOrigin::Default,
    ))
}

/// Resolve the build's Python version through the fallback chain and
/// the catalog. Fails hard with `VersionNotFound` when the request (or
/// the default) is absent from the catalog for the current stack.
pub fn resolve(
    source_dir: &Path,
    prior_full: Option<&str>,
    stack: &str,
    catalog: &dyn VersionCatalog,
) -> MoltResult<VersionSpec> {
    let (requested, origin) = requested_version(source_dir, prior_full)?;

    let source_name = match origin {
        VersionOrigin::ExplicitFile => VERSION_FILE,
        VersionOrigin::DeprecatedFile => LEGACY_VERSION_FILE,
        VersionOrigin::CachedMajor => "previous build",
        VersionOrigin::Default => "default",
    };

    let resolved = match parse_request(&requested, source_name)? {
        Request::Exact(version) => {
            if !catalog.supports(&version, stack)? {
                return Err(MoltError::VersionNotFound {
                    requested: version.to_string(),
                    stack: stack.to_string(),
                });
            }
            version
        }
        Request::Line { major, minor } => catalog.resolve_line(major, minor, stack)?,
    };

    debug!(
        "Resolved Python {} (requested '{}' via {})",
        resolved, requested, origin
    );

    Ok(VersionSpec {
        requested,
        origin,
        resolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use tempfile::TempDir;

    const STACK: &str = "ubuntu-24";

    fn resolve_in(dir: &Path, prior: Option<&str>) -> MoltResult<VersionSpec> {
        resolve(dir, prior, STACK, &StaticCatalog::new())
    }

    #[test]
    fn no_file_no_prior_uses_default() {
        let dir = TempDir::new().unwrap();
        let spec = resolve_in(dir.path(), None).unwrap();

        assert_eq!(spec.origin, VersionOrigin::Default);
        assert_eq!(spec.requested, DEFAULT_PYTHON_VERSION);
        assert_eq!(spec.resolved.to_string(), DEFAULT_PYTHON_VERSION);
    }

    #[test]
    fn line_request_resolves_latest_patch() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3.11\n").unwrap();

        let spec = resolve_in(dir.path(), None).unwrap();
        assert_eq!(spec.origin, VersionOrigin::ExplicitFile);
        assert_eq!(spec.resolved.to_string(), "3.11.9");
    }

    #[test]
    fn exact_request_is_validated() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3.12.7").unwrap();

        let spec = resolve_in(dir.path(), None).unwrap();
        assert_eq!(spec.resolved.to_string(), "3.12.7");
    }

    #[test]
    fn unknown_exact_version_fails_hard() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3.12.999").unwrap();

        let err = resolve_in(dir.path(), None).unwrap_err();
        assert!(matches!(err, MoltError::VersionNotFound { .. }));
        assert_eq!(err.failure_reason(), "python-version-not-found");
    }

    #[test]
    fn legacy_file_honored_with_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LEGACY_VERSION_FILE), "python-3.12.7\n").unwrap();

        let spec = resolve_in(dir.path(), None).unwrap();
        assert_eq!(spec.origin, VersionOrigin::DeprecatedFile);
        assert_eq!(spec.resolved.to_string(), "3.12.7");
    }

    #[test]
    fn preferred_file_beats_legacy_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3.12").unwrap();
        std::fs::write(dir.path().join(LEGACY_VERSION_FILE), "python-3.10.16").unwrap();

        let spec = resolve_in(dir.path(), None).unwrap();
        assert_eq!(spec.origin, VersionOrigin::ExplicitFile);
        assert_eq!(spec.resolved.to_string(), "3.12.7");
    }

    #[test]
    fn prior_version_sticks_to_line() {
        let dir = TempDir::new().unwrap();
        let spec = resolve_in(dir.path(), Some("3.10.2")).unwrap();

        assert_eq!(spec.origin, VersionOrigin::CachedMajor);
        assert_eq!(spec.requested, "3.10");
        // Latest patch of the line, not the previously installed patch
        assert_eq!(spec.resolved.to_string(), "3.10.16");
    }

    #[test]
    fn explicit_file_beats_prior_version() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3.13.2").unwrap();

        let spec = resolve_in(dir.path(), Some("3.10.2")).unwrap();
        assert_eq!(spec.origin, VersionOrigin::ExplicitFile);
        assert_eq!(spec.resolved.to_string(), "3.13.2");
    }

    #[test]
    fn garbage_prior_version_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let spec = resolve_in(dir.path(), Some("not-a-version")).unwrap();
        assert_eq!(spec.origin, VersionOrigin::Default);
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(VERSION_FILE),
            "# pinned for ABI compatibility\n\n3.11\n",
        )
        .unwrap();

        let spec = resolve_in(dir.path(), None).unwrap();
        assert_eq!(spec.resolved.to_string(), "3.11.9");
    }

    #[test]
    fn empty_version_file_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "\n# no version here\n").unwrap();

        let err = resolve_in(dir.path(), None).unwrap_err();
        assert!(matches!(err, MoltError::VersionRequestInvalid { .. }));
    }

    #[test]
    fn single_component_request_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "3").unwrap();

        let err = resolve_in(dir.path(), None).unwrap_err();
        assert!(matches!(err, MoltError::VersionRequestInvalid { .. }));
    }

    #[test]
    fn origin_display_slugs() {
        assert_eq!(VersionOrigin::ExplicitFile.to_string(), "explicit-file");
        assert_eq!(VersionOrigin::CachedMajor.to_string(), "cached-major");
    }
}
