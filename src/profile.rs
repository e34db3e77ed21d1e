//! Launch environment scripts
//!
//! The build's runtime environment is communicated to the launch phase
//! through shell fragments under `.profile.d/`, sourced by the app's
//! entrypoint. Values are written inside double quotes so references
//! like `$PATH` expand at launch, not at build time.

use crate::error::{MoltError, MoltResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const PROFILE_DIR: &str = ".profile.d";

/// Accumulates export lines and writes them as one profile script
pub struct ProfileWriter {
    dir: PathBuf,
    exports: Vec<(String, String)>,
}

impl ProfileWriter {
    pub fn new(build_dir: &Path) -> Self {
        Self {
            dir: build_dir.join(PROFILE_DIR),
            exports: Vec::new(),
        }
    }

    /// Queue an export; later sets for the same name win at source time
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.exports.push((name.into(), value.into()));
    }

    /// Write the queued exports to `.profile.d/<filename>`
    pub async fn write(&self, filename: &str) -> MoltResult<PathBuf> {
        let path = self.dir.join(filename);

        let mut script = String::new();
        for (name, value) in &self.exports {
            script.push_str(&format!("export {}=\"{}\"\n", name, value));
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MoltError::io("creating .profile.d", e))?;
        fs::write(&path, script)
            .await
            .map_err(|e| MoltError::io(format!("writing {}", path.display()), e))?;

        debug!("Wrote launch profile {}", path.display());
        Ok(path)
    }
}
