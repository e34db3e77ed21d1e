//! Error types for Molt
//!
//! All modules use `MoltResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Molt operations
pub type MoltResult<T> = Result<T, MoltError>;

/// All errors that can occur during a build
#[derive(Error, Debug)]
pub enum MoltError {
    // Version errors
    #[error("Python {requested} is not available for stack {stack}. Pick a supported version.")]
    VersionNotFound { requested: String, stack: String },

    #[error("Invalid Python version requirement '{value}' in {source_name}: {reason}")]
    VersionRequestInvalid {
        value: String,
        source_name: String,
        reason: String,
    },

    // Network errors
    #[error("Download failed for {url}: {reason}")]
    Download {
        url: String,
        reason: String,
        /// HTTP status when the server answered, `None` for transport
        /// failures
        status: Option<u16>,
    },

    // Package manager errors
    #[error("Conflicting package manager files: {first} and {second} are both present. Remove one.")]
    AmbiguousPackageManager { first: String, second: String },

    // Cache errors
    #[error("Cache artifact at {path} is unreadable or incomplete: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Invalid metadata record at {path}: {reason}")]
    MetadataInvalid { path: PathBuf, reason: String },

    // Hook errors
    #[error("Hook script {script} exited with status {code}")]
    HookFailure { script: String, code: i32 },

    // Context errors
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MoltError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Check if error is retryable (transient network condition)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Download { .. })
    }

    /// Stable classification slug recorded as `failure_reason` in the
    /// metadata store before the process exits.
    pub fn failure_reason(&self) -> &'static str {
        match self {
            Self::VersionNotFound { .. } => "python-version-not-found",
            Self::VersionRequestInvalid { .. } => "python-version-invalid",
            Self::Download { .. } => "download-failure",
            Self::AmbiguousPackageManager { .. } => "ambiguous-package-manager",
            Self::CacheCorrupt { .. } => "cache-corrupt",
            Self::MetadataInvalid { .. } => "metadata-invalid",
            Self::HookFailure { .. } => "hook-failure",
            Self::PathNotFound(_) => "path-not-found",
            Self::Io { .. } => "io-error",
            Self::CommandFailed { .. } | Self::CommandExecution { .. } => "command-failure",
            Self::Json(_) | Self::TomlParse(_) => "serialization-error",
            Self::Internal(_) => "internal-error",
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::VersionNotFound { .. } => {
                Some("Declare a supported version in .python-version")
            }
            Self::Download { .. } => Some("Transient network issue, retry the build"),
            Self::AmbiguousPackageManager { .. } => {
                Some("Keep exactly one package manager's lock file in the repo")
            }
            Self::HookFailure { .. } => Some("Check the hook script's output above"),
            _ => None,
        }
    }
}
