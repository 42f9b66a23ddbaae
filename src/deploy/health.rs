// ABOUTME: Health verification loop shared by deployments and rollbacks.
// ABOUTME: Polls the target until healthy, retries are spent, or the overall timeout passes.

use std::time::{Duration, Instant};

use crate::config::HealthcheckConfig;

use super::error::DeployError;
use super::target::{DeployContext, DeployTarget};

/// Wait for `target` to report healthy.
///
/// Waits `start_period`, then probes every `interval` with a per-attempt
/// `timeout`. Unhealthy results, probe errors and probe timeouts all spend
/// one retry; the first failure after retries run out is final.
pub async fn wait_healthy(
    target: &dyn DeployTarget,
    ctx: &DeployContext,
    healthcheck: &HealthcheckConfig,
    timeout: Duration,
) -> Result<(), DeployError> {
    let start = Instant::now();
    let mut retries_remaining = healthcheck.retries;

    if healthcheck.start_period > Duration::ZERO {
        tokio::time::sleep(healthcheck.start_period).await;
    }

    while start.elapsed() < timeout {
        let failure = match tokio::time::timeout(healthcheck.timeout, target.health_check(ctx)).await
        {
            Ok(Ok(true)) => {
                tracing::debug!(environment = %ctx.environment, "Health check passed");
                return Ok(());
            }
            Ok(Ok(false)) => "reported unhealthy after retries exhausted".to_string(),
            Ok(Err(e)) => format!("healthcheck exec failed: {e}"),
            Err(_elapsed) => "healthcheck timeout after retries exhausted".to_string(),
        };

        if retries_remaining == 0 {
            return Err(DeployError::HealthCheckFailed(failure));
        }
        retries_remaining -= 1;
        tracing::debug!(
            environment = %ctx.environment,
            retries_remaining,
            "Health check not passing yet"
        );

        tokio::time::sleep(healthcheck.interval).await;
    }

    Err(DeployError::HealthCheckTimeout(timeout))
}
