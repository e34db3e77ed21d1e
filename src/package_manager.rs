//! Package manager detection
//!
//! Inspects a fixed, ordered set of marker files and maps every source
//! tree to exactly one manager. Poetry markers are checked first, then
//! Pipenv, then Pip as the unmarked default, so repeated invocations on
//! the same tree always agree.

use crate::error::{MoltError, MoltResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported dependency managers, mutually exclusive per build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManagerKind {
    /// requirements.txt, the unmarked default
    Pip,
    /// Pipfile / Pipfile.lock
    Pipenv,
    /// poetry.lock or pyproject.toml with `[tool.poetry]`
    Poetry,
}

impl PackageManagerKind {
    /// Dependency declaration consulted by the install step, in
    /// priority order (first existing file wins)
    fn declaration_candidates(&self) -> &'static [&'static str] {
        match self {
            Self::Pip => &["requirements.txt"],
            Self::Pipenv => &["Pipfile.lock", "Pipfile"],
            Self::Poetry => &["poetry.lock", "pyproject.toml"],
        }
    }

    /// The declaration file present in `source_dir`, if any
    pub fn declaration_file(&self, source_dir: &Path) -> Option<PathBuf> {
        self.declaration_candidates()
            .iter()
            .map(|name| source_dir.join(name))
            .find(|p| p.is_file())
    }

    /// Parse from a metadata label value
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "pip" => Some(Self::Pip),
            "pipenv" => Some(Self::Pipenv),
            "poetry" => Some(Self::Poetry),
            _ => None,
        }
    }
}

impl fmt::Display for PackageManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pip => "pip",
            Self::Pipenv => "pipenv",
            Self::Poetry => "poetry",
        };
        write!(f, "{}", name)
    }
}

/// Whether pyproject.toml declares a `[tool.poetry]` section
fn pyproject_uses_poetry(source_dir: &Path) -> MoltResult<bool> {
    let path = source_dir.join("pyproject.toml");
    if !path.is_file() {
        return Ok(false);
    }

    let content = fs::read_to_string(&path)
        .map_err(|e| MoltError::io(format!("reading {}", path.display()), e))?;
    let doc: toml::Value = toml::from_str(&content)?;

    Ok(doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .is_some())
}

/// Choose exactly one package manager for the source tree.
///
/// Conflicting lock files for two managers are the one configuration
/// priority order cannot resolve silently: both lock files pin a full
/// dependency set, and honoring one would quietly ignore the other.
pub fn detect(source_dir: &Path) -> MoltResult<PackageManagerKind> {
    let poetry_lock = source_dir.join("poetry.lock").is_file();
    let pipenv_lock = source_dir.join("Pipfile.lock").is_file();

    if poetry_lock && pipenv_lock {
        return Err(MoltError::AmbiguousPackageManager {
            first: "poetry.lock".to_string(),
            second: "Pipfile.lock".to_string(),
        });
    }

    let kind = if poetry_lock || pyproject_uses_poetry(source_dir)? {
        PackageManagerKind::Poetry
    } else if source_dir.join("Pipfile").is_file() {
        PackageManagerKind::Pipenv
    } else {
        PackageManagerKind::Pip
    };

    debug!("Detected package manager: {}", kind);
    Ok(kind)
}

/// Content hash of the dependency declaration (first 12 hex chars),
/// recorded in metadata as a change diagnostic across builds.
pub fn dependency_hash(
    source_dir: &Path,
    kind: PackageManagerKind,
) -> MoltResult<Option<String>> {
    let Some(path) = kind.declaration_file(source_dir) else {
        return Ok(None);
    };

    let contents = fs::read(&path)
        .map_err(|e| MoltError::io(format!("reading {}", path.display()), e))?;

    let mut hasher = Sha256::new();
    hasher.update(&contents);
    let digest = hasher.finalize();

    Ok(Some(hex::encode(&digest[..6])))
}
