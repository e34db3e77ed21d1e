//! App-provided build hooks
//!
//! Apps can ship `bin/pre_compile` and `bin/post_compile` scripts that
//! run before dependency install and after the build respectively.
//! Hooks run through bash with the build dir as cwd and the same
//! environment overlay as every other subprocess.

use crate::context::BuildContext;
use crate::error::{MoltError, MoltResult};
use crate::install::EnvOverlay;
use std::process::Stdio;
use tracing::{debug, info};

pub const PRE_COMPILE: &str = "bin/pre_compile";
pub const POST_COMPILE: &str = "bin/post_compile";

/// Run a hook script if the app provides one.
///
/// Returns whether the hook ran. A non-zero exit is the app telling us
/// the build cannot proceed, so it maps to a dedicated error.
pub async fn run_hook(
    ctx: &BuildContext,
    overlay: &EnvOverlay,
    script: &str,
) -> MoltResult<bool> {
    let path = ctx.build_dir.join(script);
    if !path.is_file() {
        debug!("No {} hook", script);
        return Ok(false);
    }

    info!("Running {} hook", script);
    let status = crate::install::command("bash", ctx, overlay)
        .arg(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|e| MoltError::command_failed(format!("bash {}", script), e))?;

    if status.success() {
        Ok(true)
    } else {
        Err(MoltError::HookFailure {
            script: script.to_string(),
            code: status.code().unwrap_or(-1),
        })
    }
}
