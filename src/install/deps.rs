//! Package manager bootstrap and dependency installation
//!
//! One tool invocation per detected manager, always through the
//! overlay-carrying command constructor so installs land in the
//! dependency prefix the cache manages.

use super::EnvOverlay;
use crate::context::BuildContext;
use crate::error::MoltResult;
use crate::package_manager::PackageManagerKind;
use async_trait::async_trait;
use tracing::{info, warn};

/// Bootstraps the manager tooling and installs declared dependencies
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Make the detected manager's tooling available in the build
    async fn install_manager(
        &self,
        ctx: &BuildContext,
        overlay: &EnvOverlay,
        kind: PackageManagerKind,
    ) -> MoltResult<()>;

    /// Install the dependencies the declaration file names
    async fn install_dependencies(
        &self,
        ctx: &BuildContext,
        overlay: &EnvOverlay,
        kind: PackageManagerKind,
    ) -> MoltResult<()>;
}

/// Real installer, shelling out to the provisioned runtime's tooling
pub struct SubprocessInstaller;

#[async_trait]
impl DependencyInstaller for SubprocessInstaller {
    async fn install_manager(
        &self,
        ctx: &BuildContext,
        overlay: &EnvOverlay,
        kind: PackageManagerKind,
    ) -> MoltResult<()> {
        // pip ships with the runtime; upgrade it in place, and install
        // the other managers through it into the deps prefix
        let package = match kind {
            PackageManagerKind::Pip => "pip",
            PackageManagerKind::Pipenv => "pipenv",
            PackageManagerKind::Poetry => "poetry",
        };

        info!("Bootstrapping {}", package);
        let mut cmd = super::command("python", ctx, overlay);
        cmd.args([
            "-m",
            "pip",
            "install",
            "--user",
            "--upgrade",
            "--disable-pip-version-check",
            "--no-cache-dir",
            package,
        ]);
        super::run_streamed(cmd, &format!("pip install {}", package)).await
    }

    async fn install_dependencies(
        &self,
        ctx: &BuildContext,
        overlay: &EnvOverlay,
        kind: PackageManagerKind,
    ) -> MoltResult<()> {
        if kind.declaration_file(&ctx.build_dir).is_none() {
            warn!("No dependency declaration found, skipping install");
            return Ok(());
        }

        info!("Installing dependencies with {}", kind);
        match kind {
            PackageManagerKind::Pip => {
                let mut cmd = super::command("python", ctx, overlay);
                cmd.args([
                    "-m",
                    "pip",
                    "install",
                    "--user",
                    "--disable-pip-version-check",
                    "-r",
                    "requirements.txt",
                ]);
                super::run_streamed(cmd, "pip install -r requirements.txt").await
            }
            PackageManagerKind::Pipenv => {
                let mut cmd = super::command("pipenv", ctx, overlay);
                // --deploy refuses to run when Pipfile.lock is stale
                if ctx.build_dir.join("Pipfile.lock").is_file() {
                    cmd.args(["install", "--deploy"]);
                } else {
                    cmd.args(["install", "--skip-lock"]);
                }
                super::run_streamed(cmd, "pipenv install").await
            }
            PackageManagerKind::Poetry => {
                let mut cmd = super::command("poetry", ctx, overlay);
                cmd.args(["install", "--sync", "--no-root", "--no-interaction"]);
                super::run_streamed(cmd, "poetry install").await
            }
        }
    }
}

impl SubprocessInstaller {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SubprocessInstaller {
    fn default() -> Self {
        Self::new()
    }
}
