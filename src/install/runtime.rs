//! Python runtime provisioning
//!
//! Fetches a prebuilt runtime archive for the build's stack and unpacks
//! it into the build prefix. Archive extraction shells out to the
//! system `tar`, which handles symlinks and permissions correctly.

use super::EnvOverlay;
use crate::context::BuildContext;
use crate::error::{MoltError, MoltResult};
use crate::net;
use async_trait::async_trait;
use semver::Version;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

const DEFAULT_RUNTIME_BASE_URL: &str = "https://runtimes.molt.sh/python";

/// Provisions the Python runtime into the build prefix
#[async_trait]
pub trait RuntimeInstaller: Send + Sync {
    async fn install(&self, ctx: &BuildContext, version: &Version) -> MoltResult<()>;
}

/// Downloads `{base}/{stack}/python-{version}.tar.gz` and unpacks it
pub struct ArchiveInstaller {
    base_url: String,
}

impl ArchiveInstaller {
    pub fn new(ctx: &BuildContext) -> Self {
        let base_url = ctx
            .var("MOLT_RUNTIME_BASE_URL")
            .unwrap_or(DEFAULT_RUNTIME_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Self { base_url }
    }

    fn archive_url(&self, stack: &str, version: &Version) -> String {
        format!("{}/{}/python-{}.tar.gz", self.base_url, stack, version)
    }
}

#[async_trait]
impl RuntimeInstaller for ArchiveInstaller {
    async fn install(&self, ctx: &BuildContext, version: &Version) -> MoltResult<()> {
        let url = self.archive_url(&ctx.stack, version);
        let runtime_dir = ctx.runtime_dir();
        let scratch = ctx.scratch_dir();
        let archive: PathBuf = scratch.join("python.tar.gz");

        info!("Installing Python {}", version);
        debug!("Fetching {}", url);

        fs::create_dir_all(&scratch)
            .await
            .map_err(|e| MoltError::io("creating scratch dir", e))?;
        fs::create_dir_all(&runtime_dir)
            .await
            .map_err(|e| MoltError::io("creating runtime dir", e))?;

        let fetch_url = url.clone();
        let fetch_dest = archive.clone();
        tokio::task::spawn_blocking(move || net::download_to(&fetch_url, &fetch_dest))
            .await
            .map_err(|e| MoltError::Internal(format!("download task panicked: {}", e)))??;

        let overlay = EnvOverlay::new();
        let mut cmd = super::command("tar", ctx, &overlay);
        cmd.arg("-xzf").arg(&archive).arg("-C").arg(&runtime_dir);
        super::run_streamed(cmd, "tar -xzf python.tar.gz").await?;

        fs::remove_file(&archive)
            .await
            .map_err(|e| MoltError::io("removing runtime archive", e))?;

        Ok(())
    }
}
