// ABOUTME: Rollback coordination: choosing a release to restore and restoring it.
// ABOUTME: Used for operator-requested rollbacks and automatic recovery from failed deployments.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::HealthcheckConfig;
use crate::deploy::{DeployContext, DeployError, DeployTarget, TargetError, wait_healthy};
use crate::promotion::{ReleaseRecord, ReleaseStatus};
use crate::types::Version;

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("no successful release to roll back from")]
    NoCurrentRelease,

    #[error("no earlier release to roll back to from {current}")]
    NoPreviousRelease { current: String },

    #[error("no successful release of {0} to roll back to")]
    VersionNotFound(String),

    #[error("{0} is already the current release")]
    AlreadyCurrent(String),

    #[error("revert failed: {0}")]
    Revert(#[source] TargetError),

    #[error("restored release is unhealthy: {0}")]
    Unhealthy(#[source] DeployError),
}

/// What a rollback did.
#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub from: Version,
    pub to: Version,
    pub finished_at: DateTime<Utc>,
}

/// The most recent successful release: what is running now.
fn current(history: &[ReleaseRecord]) -> Option<&ReleaseRecord> {
    history
        .iter()
        .rev()
        .find(|r| r.status == ReleaseStatus::Succeeded)
}

/// Choose the release to restore.
///
/// With `requested`, its most recent successful release; otherwise the most
/// recent successful release of a version other than the current one. A
/// release that was itself rolled back is never a target.
pub fn select_target<'a>(
    history: &'a [ReleaseRecord],
    requested: Option<&Version>,
) -> Result<&'a ReleaseRecord, RollbackError> {
    let current = current(history).ok_or(RollbackError::NoCurrentRelease)?;

    let mut earlier = history.iter().rev().filter(|r| {
        r.status == ReleaseStatus::Succeeded && r.deployment_id != current.deployment_id
    });

    match requested {
        Some(version) if version == &current.version => {
            Err(RollbackError::AlreadyCurrent(version.to_string()))
        }
        Some(version) => earlier
            .find(|r| &r.version == version)
            .ok_or_else(|| RollbackError::VersionNotFound(version.to_string())),
        None => earlier
            .find(|r| r.version != current.version)
            .ok_or_else(|| RollbackError::NoPreviousRelease {
                current: current.version.to_string(),
            }),
    }
}

/// Revert `ctx`'s environment to `to` and wait until it is healthy.
pub async fn revert_and_verify(
    target: &dyn DeployTarget,
    ctx: &DeployContext,
    to: &ReleaseRecord,
    healthcheck: Option<&HealthcheckConfig>,
    health_timeout: Duration,
) -> Result<(), RollbackError> {
    target.revert(ctx, to).await.map_err(RollbackError::Revert)?;

    if let Some(healthcheck) = healthcheck {
        let restored = ctx.reverting_to(to);
        wait_healthy(target, &restored, healthcheck, health_timeout)
            .await
            .map_err(RollbackError::Unhealthy)?;
    }
    Ok(())
}

/// Restores an earlier release in one environment.
pub struct RollbackCoordinator {
    target: Arc<dyn DeployTarget>,
    healthcheck: Option<HealthcheckConfig>,
    health_timeout: Duration,
}

impl RollbackCoordinator {
    pub fn new(
        target: Arc<dyn DeployTarget>,
        healthcheck: Option<HealthcheckConfig>,
        health_timeout: Duration,
    ) -> Self {
        Self {
            target,
            healthcheck,
            health_timeout,
        }
    }

    /// Revert from the release described by `ctx` to `to`.
    ///
    /// Recording the outcome in the ledger is left to the caller.
    pub async fn execute(
        &self,
        ctx: &DeployContext,
        to: &ReleaseRecord,
    ) -> Result<RollbackOutcome, RollbackError> {
        tracing::info!(
            environment = %ctx.environment,
            from = %ctx.version,
            to = %to.version,
            "Rolling back"
        );

        revert_and_verify(
            self.target.as_ref(),
            ctx,
            to,
            self.healthcheck.as_ref(),
            self.health_timeout,
        )
        .await?;

        Ok(RollbackOutcome {
            from: ctx.version.clone(),
            to: to.version.clone(),
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactRef;

    fn record(version: &str, status: ReleaseStatus) -> ReleaseRecord {
        let mut record = ReleaseRecord::start(
            Version::parse(version).unwrap(),
            ArtifactRef::parse(&format!("shop:{version}")).unwrap(),
            "ci",
        );
        record.status = status;
        record
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn empty_history_has_nothing_to_roll_back() {
        let err = select_target(&[], None).unwrap_err();
        assert!(matches!(err, RollbackError::NoCurrentRelease));
    }

    #[test]
    fn picks_latest_success_of_another_version() {
        let history = vec![
            record("1.0.0", ReleaseStatus::Succeeded),
            record("1.1.0", ReleaseStatus::Succeeded),
            record("1.2.0", ReleaseStatus::Failed),
            record("1.2.1", ReleaseStatus::Succeeded),
        ];
        let target = select_target(&history, None).unwrap();
        assert_eq!(target.version, v("1.1.0"));
    }

    #[test]
    fn redeploys_of_current_version_are_skipped() {
        let history = vec![
            record("1.0.0", ReleaseStatus::Succeeded),
            record("1.1.0", ReleaseStatus::Succeeded),
            record("1.1.0", ReleaseStatus::Succeeded),
        ];
        assert_eq!(select_target(&history, None).unwrap().version, v("1.0.0"));
    }

    #[test]
    fn only_one_version_means_no_previous() {
        let history = vec![record("1.0.0", ReleaseStatus::Succeeded)];
        let err = select_target(&history, None).unwrap_err();
        assert!(matches!(err, RollbackError::NoPreviousRelease { .. }));
    }

    #[test]
    fn requested_version_must_have_succeeded() {
        let history = vec![
            record("1.0.0", ReleaseStatus::Failed),
            record("1.1.0", ReleaseStatus::Succeeded),
        ];
        let err = select_target(&history, Some(&v("1.0.0"))).unwrap_err();
        assert!(matches!(err, RollbackError::VersionNotFound(_)));

        let err = select_target(&history, Some(&v("1.1.0"))).unwrap_err();
        assert!(matches!(err, RollbackError::AlreadyCurrent(_)));
    }

    #[test]
    fn rolled_back_release_is_not_restored() {
        // 1.1.0 was rolled back to 1.0.0.
        let mut restored = record("1.0.0", ReleaseStatus::Succeeded);
        restored.rolled_back_from = Some(v("1.1.0"));
        let history = vec![
            record("1.0.0", ReleaseStatus::Succeeded),
            record("1.1.0", ReleaseStatus::RolledBack),
            restored,
        ];
        let err = select_target(&history, None).unwrap_err();
        assert!(matches!(err, RollbackError::NoPreviousRelease { .. }));

        let err = select_target(&history, Some(&v("1.1.0"))).unwrap_err();
        assert!(matches!(err, RollbackError::VersionNotFound(_)));
    }

    #[test]
    fn rolled_back_release_is_skipped_for_older_success() {
        let mut restored = record("1.0.0", ReleaseStatus::Succeeded);
        restored.rolled_back_from = Some(v("1.1.0"));
        let history = vec![
            record("0.9.0", ReleaseStatus::Succeeded),
            record("1.0.0", ReleaseStatus::Succeeded),
            record("1.1.0", ReleaseStatus::RolledBack),
            restored,
        ];
        assert_eq!(select_target(&history, None).unwrap().version, v("0.9.0"));
    }
}
