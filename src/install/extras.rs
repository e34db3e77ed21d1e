//! Framework-specific post-install steps
//!
//! Currently just Django static asset collection, detected by the
//! presence of manage.py and skippable with DISABLE_COLLECTSTATIC.

use super::EnvOverlay;
use crate::context::BuildContext;
use crate::error::MoltResult;
use tracing::info;

/// Run `manage.py collectstatic` for Django apps.
///
/// Returns whether the step ran. Failures propagate: a broken static
/// pipeline would otherwise surface as missing assets at run time.
pub async fn collect_static(ctx: &BuildContext, overlay: &EnvOverlay) -> MoltResult<bool> {
    if !ctx.build_dir.join("manage.py").is_file() {
        return Ok(false);
    }

    if ctx.var("DISABLE_COLLECTSTATIC").is_some() {
        info!("Skipping collectstatic (DISABLE_COLLECTSTATIC set)");
        return Ok(false);
    }

    info!("Collecting Django static files");
    let mut cmd = super::command("python", ctx, overlay);
    cmd.args(["manage.py", "collectstatic", "--noinput"]);
    super::run_streamed(cmd, "python manage.py collectstatic").await?;
    Ok(true)
}
