//! Build context shared by every pipeline step
//!
//! A `BuildContext` is constructed once at process start from the three
//! positional directories and never mutated afterwards. Everything that
//! needs a path or an inbound variable borrows it.

use crate::error::{MoltError, MoltResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Stack assumed when the platform provides none
pub const DEFAULT_STACK: &str = "ubuntu-24";

/// Inbound variables captured from the env dir. Everything else the
/// platform writes there is ignored so unrelated settings cannot leak
/// into install subprocesses.
const CAPTURED_VARS: &[&str] = &[
    "STACK",
    "SOURCE_VERSION",
    "PIP_INDEX_URL",
    "PIP_EXTRA_INDEX_URL",
    "MOLT_CATALOG_URL",
    "MOLT_RUNTIME_BASE_URL",
    "DISABLE_COLLECTSTATIC",
];

/// Immutable per-build facts and paths
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Application source being built (also the install destination)
    pub build_dir: PathBuf,
    /// Persistent cache directory owned by this app
    pub cache_dir: PathBuf,
    /// Directory containing one file per platform-provided variable
    pub env_dir: PathBuf,
    /// OS/ABI generation identifier; compatibility boundary for binaries
    pub stack: String,
    /// Captured subset of inbound environment variables
    pub env: BTreeMap<String, String>,
}

impl BuildContext {
    /// Build a context from the invocation directories.
    ///
    /// The build and cache directories must exist; the env dir is
    /// optional (some executors omit it when no config vars are set).
    pub async fn new(
        build_dir: PathBuf,
        cache_dir: PathBuf,
        env_dir: PathBuf,
    ) -> MoltResult<Self> {
        if !build_dir.is_dir() {
            return Err(MoltError::PathNotFound(build_dir));
        }
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| MoltError::io(format!("creating cache dir {}", cache_dir.display()), e))?;

        let env = read_env_dir(&env_dir).await?;
        let stack = env
            .get("STACK")
            .cloned()
            .or_else(|| std::env::var("STACK").ok())
            .unwrap_or_else(|| DEFAULT_STACK.to_string());

        debug!("Build context: stack={}, {} captured vars", stack, env.len());

        Ok(Self {
            build_dir,
            cache_dir,
            env_dir,
            stack,
            env,
        })
    }

    /// Install prefix for the Python runtime inside the build tree
    pub fn runtime_dir(&self) -> PathBuf {
        self.build_dir.join(".molt").join("python")
    }

    /// Install prefix for dependencies, kept separate from the runtime
    /// so the two can be invalidated independently
    pub fn deps_dir(&self) -> PathBuf {
        self.build_dir.join(".molt").join("deps")
    }

    /// Scratch space for downloads, cleaned up by the executor
    pub fn scratch_dir(&self) -> PathBuf {
        self.build_dir.join(".molt").join("tmp")
    }

    /// Look up a captured variable
    pub fn var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}

/// Read the one-file-per-variable env dir, keeping only captured names.
async fn read_env_dir(env_dir: &Path) -> MoltResult<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();

    if !env_dir.is_dir() {
        debug!("Env dir {} missing, no platform vars", env_dir.display());
        return Ok(vars);
    }

    for name in CAPTURED_VARS {
        let path = env_dir.join(name);
        if !path.is_file() {
            continue;
        }
        let value = fs::read_to_string(&path)
            .await
            .map_err(|e| MoltError::io(format!("reading env file {}", path.display()), e))?;
        vars.insert((*name).to_string(), value.trim_end_matches('\n').to_string());
    }

    Ok(vars)
}
