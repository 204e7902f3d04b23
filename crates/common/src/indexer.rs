use std::{future::Future, time::Duration};

use tokio::time::sleep;

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_millis(2_000);

/// Runs `operation` until it succeeds or `max_attempts` attempts have failed,
/// sleeping `delay` between attempts. The last error is returned.
pub async fn with_retry_policy<F, Fut, T, E>(
    max_attempts: u32,
    delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                tracing::warn!(attempt, error = %e, "Operation failed, retrying in {:?}", delay);
                sleep(delay).await;
            }
        }
    }
}
