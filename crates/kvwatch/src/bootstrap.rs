//! startup probing with exponential backoff
use crate::config::BootstrapPolicy;
use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Run `probe` until it succeeds
///
/// After each failure we wait, starting with [BootstrapPolicy::base_delay] and doubling every time. Once the waits
/// add up to [BootstrapPolicy::max_elapsed] the last probe error is returned. The last wait is shortened so the total
/// never exceeds the ceiling.
pub async fn probe_with_backoff<F, Fut>(policy: &BootstrapPolicy, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let ceiling = policy.max_elapsed();
    let mut delay = policy.base_delay().max(Duration::from_millis(1));
    let mut waited = Duration::ZERO;
    let mut attempt = 1u32;

    loop {
        let err = match probe().await {
            Ok(()) => {
                tracing::debug!(attempt, "probe succeeded");
                return Ok(());
            }
            Err(err) => err,
        };

        if waited >= ceiling {
            tracing::warn!(attempt, ?waited, %err, "giving up");
            return Err(err);
        }

        let wait = delay.min(ceiling - waited);
        tracing::info!(attempt, %err, ?wait, "probe failed, retrying");
        tokio::time::sleep(wait).await;

        waited += wait;
        delay = delay.saturating_mul(2);
        attempt += 1;
    }
}
