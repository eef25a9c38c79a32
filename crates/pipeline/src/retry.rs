//! Bounded retry for one-shot backend calls made during submission.
//!
//! Submission calls (job creation, theme transforms, theme saves) get the
//! same tolerance as status polling: a retryable error is retried after
//! [`PollConfig::interval`] until [`PollConfig::error_threshold`] attempts
//! have failed, and the last error is returned.

use std::future::Future;

use atelier_core::error::CoreError;

use crate::poller::PollConfig;

/// Run `call` until it succeeds, fails with a non-retryable error, or has
/// failed `config.error_threshold` times in a row.
pub async fn with_retries<T, F, Fut>(
    op: &'static str,
    config: PollConfig,
    mut call: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let threshold = config.error_threshold.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < threshold => {
                tracing::warn!(
                    op,
                    attempt,
                    threshold,
                    error = %e,
                    "Backend call failed, will retry",
                );
                tokio::time::sleep(config.interval).await;
            }
            Err(e) => return Err(e),
        }
    }
}
