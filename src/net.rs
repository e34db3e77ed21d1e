//! HTTP fetch helpers with bounded retry
//!
//! All network access (catalog index, runtime archive) funnels through
//! here. Transport-level failures are retried a fixed number of times
//! with a connect-timeout bound; HTTP status errors are deterministic
//! and returned immediately. These calls block, so async callers run
//! them under `spawn_blocking`.

use crate::error::{MoltError, MoltResult};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(2);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_connect(Some(CONNECT_TIMEOUT))
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build()
        .into()
}

/// Run a request closure with bounded retry on transport errors.
///
/// Status-code errors (404 and friends) are not transient and fail
/// immediately; everything else gets `RETRY_ATTEMPTS` tries.
fn with_retry<T>(
    url: &str,
    mut op: impl FnMut(&ureq::Agent) -> Result<T, ureq::Error>,
) -> MoltResult<T> {
    let agent = agent();
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(&agent) {
            Ok(value) => return Ok(value),
            Err(ureq::Error::StatusCode(code)) => {
                return Err(MoltError::Download {
                    url: url.to_string(),
                    reason: format!("status {}", code),
                    status: Some(code),
                });
            }
            Err(e) if attempt < RETRY_ATTEMPTS => {
                warn!(
                    "Fetching {} failed (attempt {}/{}): {}",
                    url, attempt, RETRY_ATTEMPTS, e
                );
                std::thread::sleep(RETRY_PAUSE);
            }
            Err(e) => {
                return Err(MoltError::Download {
                    url: url.to_string(),
                    reason: e.to_string(),
                    status: None,
                });
            }
        }
    }
}

/// Fetch a small text document (catalog index)
pub(crate) fn fetch_string(url: &str) -> MoltResult<String> {
    with_retry(url, |agent| {
        let mut response = agent.get(url).call()?;
        response.body_mut().read_to_string()
    })
}

/// Stream a (possibly large) archive to `dest`, recreating it on retry
pub(crate) fn download_to(url: &str, dest: &Path) -> MoltResult<()> {
    with_retry(url, |agent| {
        let mut response = agent.get(url).call()?;
        let mut reader = response.body_mut().as_reader();
        let mut file = std::fs::File::create(dest).map_err(ureq::Error::Io)?;
        std::io::copy(&mut reader, &mut file).map_err(ureq::Error::Io)?;
        Ok(())
    })
}
