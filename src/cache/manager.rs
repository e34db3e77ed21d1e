//! Cache restore/save decisions and the on-disk artifact lifecycle
//!
//! All functions here are blocking; the pipeline runs them under
//! `spawn_blocking` since a runtime tree copy can take a while.

use crate::error::{MoltError, MoltResult};
use crate::metadata::MetadataStore;
use crate::package_manager::PackageManagerKind;
use chrono::Utc;
use semver::Version;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Artifact tree root under the cache directory
const ARTIFACT_DIR: &str = "artifact";
/// Staging area used by `save` before the swap
const STAGE_DIR: &str = "artifact.stage";
/// Swap-out name for the replaced tree
const OLD_DIR: &str = "artifact.old";
/// Marker proving the snapshot was written completely
const COMPLETE_MARKER: &str = ".complete";

/// Facts recorded by the previous build, read from the metadata store
#[derive(Debug, Clone, Default)]
pub struct PriorBuild {
    pub stack: Option<String>,
    pub version_full: Option<String>,
    pub package_manager: Option<String>,
}

impl PriorBuild {
    pub fn from_store(store: &MetadataStore) -> Self {
        Self {
            stack: store.get("stack").map(String::from),
            version_full: store.get("python_version_full").map(String::from),
            package_manager: store.get("package_manager").map(String::from),
        }
    }
}

/// What restore did with the cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// All three validity checks passed; nothing was deleted
    pub reused: bool,
    /// The runtime subtree was copied into the build prefix
    pub runtime_restored: bool,
    /// The dependency subtree was copied into the build prefix
    pub deps_restored: bool,
}

impl RestoreOutcome {
    fn cold() -> Self {
        Self {
            reused: false,
            runtime_restored: false,
            deps_restored: false,
        }
    }
}

/// Manages the single artifact snapshot under one cache directory
#[derive(Debug, Clone)]
pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    fn artifact_dir(&self) -> PathBuf {
        self.cache_dir.join(ARTIFACT_DIR)
    }

    fn runtime_dir(&self) -> PathBuf {
        self.artifact_dir().join("runtime")
    }

    fn deps_dir(&self) -> PathBuf {
        self.artifact_dir().join("deps")
    }

    /// Decide validity of the cached snapshot, purge what no longer
    /// applies, and copy the surviving subtrees into the build prefix.
    ///
    /// The three checks run in order and short-circuit: artifacts
    /// downstream of a mismatch are never inspected, only deleted.
    pub fn restore(
        &self,
        prior: &PriorBuild,
        stack: &str,
        resolved: &Version,
        manager: PackageManagerKind,
        build_runtime: &Path,
        build_deps: &Path,
    ) -> MoltResult<RestoreOutcome> {
        let artifact = self.artifact_dir();

        // Leftovers from a crashed save must never be mistaken for a
        // usable snapshot.
        purge(&self.cache_dir.join(STAGE_DIR))?;
        purge(&self.cache_dir.join(OLD_DIR))?;

        if !artifact.is_dir() {
            debug!("No cached artifact, cold build");
            return Ok(RestoreOutcome::cold());
        }

        if !artifact.join(COMPLETE_MARKER).is_file() {
            // Incomplete snapshot: recover locally by discarding it,
            // the build proceeds cold.
            let corrupt = MoltError::CacheCorrupt {
                path: artifact.clone(),
                reason: "completeness marker missing".to_string(),
            };
            warn!("{}; discarding cache", corrupt);
            purge(&artifact)?;
            return Ok(RestoreOutcome::cold());
        }

        let (Some(prior_stack), Some(prior_version), Some(prior_manager)) = (
            prior.stack.as_deref(),
            prior.version_full.as_deref(),
            prior.package_manager.as_deref(),
        ) else {
            warn!("Cached artifact has no metadata record; discarding cache");
            purge(&artifact)?;
            return Ok(RestoreOutcome::cold());
        };

        // Check 1: stack. Compiled artifacts do not cross OS/ABI
        // generations.
        if prior_stack != stack {
            info!(
                "Stack changed ({} -> {}), invalidating entire cache",
                prior_stack, stack
            );
            purge(&artifact)?;
            return Ok(RestoreOutcome::cold());
        }

        // Check 2: runtime line. Dependencies may hold compiled
        // extensions tied to the runtime ABI, so they go with it.
        let line_matches = Version::parse(prior_version)
            .map(|v| v.major == resolved.major && v.minor == resolved.minor)
            .unwrap_or(false);
        if !line_matches {
            info!(
                "Python line changed ({} -> {}), invalidating runtime and dependencies",
                prior_version, resolved
            );
            purge(&artifact)?;
            return Ok(RestoreOutcome::cold());
        }

        // Check 3: package manager. Its cache and lock format are not
        // portable across managers; the runtime itself is unaffected.
        if prior_manager != manager.to_string() {
            info!(
                "Package manager changed ({} -> {}), invalidating dependencies",
                prior_manager, manager
            );
            purge(&self.deps_dir())?;
            let runtime_restored = self.copy_out(&self.runtime_dir(), build_runtime)?;
            return Ok(RestoreOutcome {
                reused: false,
                runtime_restored,
                deps_restored: false,
            });
        }

        let runtime_restored = self.copy_out(&self.runtime_dir(), build_runtime)?;
        let deps_restored = self.copy_out(&self.deps_dir(), build_deps)?;

        info!("Cache valid, reusing runtime and dependencies");
        Ok(RestoreOutcome {
            reused: true,
            runtime_restored,
            deps_restored,
        })
    }

    /// Snapshot the build prefix into the cache, replacing the previous
    /// artifact tree.
    ///
    /// The new tree is fully staged first, then swapped in with two
    /// renames; an interruption at any point leaves either the old
    /// snapshot or the new one, never a blend.
    pub fn save(&self, build_runtime: &Path, build_deps: &Path) -> MoltResult<()> {
        let stage = self.cache_dir.join(STAGE_DIR);
        let artifact = self.artifact_dir();
        let old = self.cache_dir.join(OLD_DIR);

        purge(&stage)?;
        purge(&old)?;

        fs::create_dir_all(&stage)
            .map_err(|e| MoltError::io(format!("creating {}", stage.display()), e))?;

        if build_runtime.is_dir() {
            copy_tree(build_runtime, &stage.join("runtime"))
                .map_err(|e| MoltError::io("staging runtime into cache".to_string(), e))?;
        }
        if build_deps.is_dir() {
            copy_tree(build_deps, &stage.join("deps"))
                .map_err(|e| MoltError::io("staging dependencies into cache".to_string(), e))?;
        }

        fs::write(stage.join(COMPLETE_MARKER), Utc::now().to_rfc3339())
            .map_err(|e| MoltError::io("writing completeness marker", e))?;

        if artifact.exists() {
            fs::rename(&artifact, &old)
                .map_err(|e| MoltError::io("moving previous artifact aside", e))?;
        }
        fs::rename(&stage, &artifact)
            .map_err(|e| MoltError::io("activating staged artifact", e))?;
        purge(&old)?;

        debug!("Saved artifact snapshot to {}", artifact.display());
        Ok(())
    }

    /// Copy a cached subtree into the build prefix. Returns whether the
    /// subtree existed.
    fn copy_out(&self, cached: &Path, dest: &Path) -> MoltResult<bool> {
        if !cached.is_dir() {
            return Ok(false);
        }
        copy_tree(cached, dest).map_err(|e| {
            MoltError::io(
                format!("restoring {} into build", cached.display()),
                e,
            )
        })?;
        Ok(true)
    }
}

/// Remove a directory tree, tolerating its absence
fn purge(path: &Path) -> MoltResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!("Purged {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MoltError::io(format!("purging {}", path.display()), e)),
    }
}

/// Recursive tree copy preserving symlinks (a Python prefix links
/// `bin/python` to the versioned binary)
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());

        if file_type.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(link, &target)?;
            #[cfg(not(unix))]
            fs::copy(entry.path(), &target).map(|_| ())?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
