//! External install collaborators
//!
//! The pipeline owns ordering and decisions; the actual provisioning
//! work (runtime download, package manager bootstrap, dependency
//! install) lives behind the traits here so tests can substitute it.
//!
//! Subprocesses never see mutated process state: the pipeline threads
//! an explicit environment overlay through, and `command` is the single
//! point where the overlay is applied to a child process.

pub mod deps;
pub mod extras;
pub mod runtime;

pub use deps::{DependencyInstaller, SubprocessInstaller};
pub use runtime::{ArchiveInstaller, RuntimeInstaller};

use crate::context::BuildContext;
use crate::error::{MoltError, MoltResult};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Environment variables layered over the inherited environment for
/// every subprocess launched by the pipeline
pub type EnvOverlay = BTreeMap<String, String>;

/// Build the overlay for the current build's install prefixes.
///
/// Captured platform vars (index URLs) pass through; everything else
/// points tooling at the runtime and dependency prefixes so installs
/// land where the cache expects them.
pub fn overlay_for(ctx: &BuildContext) -> EnvOverlay {
    let runtime = ctx.runtime_dir();
    let deps = ctx.deps_dir();
    let mut overlay = EnvOverlay::new();

    let inherited_path = std::env::var("PATH").unwrap_or_default();
    overlay.insert(
        "PATH".to_string(),
        format!(
            "{}:{}:{}",
            runtime.join("bin").display(),
            deps.join("bin").display(),
            inherited_path
        ),
    );
    overlay.insert(
        "LD_LIBRARY_PATH".to_string(),
        runtime.join("lib").display().to_string(),
    );
    overlay.insert("LANG".to_string(), "C.UTF-8".to_string());
    overlay.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
    // pip --user installs, pipenv and poetry virtualenvs all resolve
    // under the deps prefix so the cache can invalidate them as a unit
    overlay.insert(
        "PYTHONUSERBASE".to_string(),
        deps.display().to_string(),
    );
    overlay.insert(
        "WORKON_HOME".to_string(),
        deps.join("virtualenvs").display().to_string(),
    );
    overlay.insert(
        "POETRY_VIRTUALENVS_PATH".to_string(),
        deps.join("virtualenvs").display().to_string(),
    );

    for name in ["PIP_INDEX_URL", "PIP_EXTRA_INDEX_URL", "SOURCE_VERSION"] {
        if let Some(value) = ctx.var(name) {
            overlay.insert(name.to_string(), value.to_string());
        }
    }

    overlay
}

/// Create a subprocess command with the overlay applied and the build
/// dir as cwd. The overlay is applied here and nowhere else.
pub fn command(program: impl AsRef<Path>, ctx: &BuildContext, overlay: &EnvOverlay) -> Command {
    let mut cmd = Command::new(program.as_ref());
    cmd.current_dir(&ctx.build_dir).envs(overlay);
    cmd
}

/// Run an install subprocess with streamed output, failing on non-zero
/// exit with the command line in the error.
pub(crate) async fn run_streamed(mut cmd: Command, label: &str) -> MoltResult<()> {
    debug!("Running {}", label);

    let status = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| MoltError::command_failed(label.to_string(), e))?;

    if status.success() {
        Ok(())
    } else {
        Err(MoltError::command_exec(
            label.to_string(),
            format!("exited with status {}", status.code().unwrap_or(-1)),
        ))
    }
}
