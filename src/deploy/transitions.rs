// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use chrono::Utc;

use crate::promotion::ReleaseRecord;
use crate::rollback::revert_and_verify;

use super::Deployment;
use super::error::DeployError;
use super::health::wait_healthy;
use super::state::{Applied, Finalized, Initialized, PreChecked, RolledBack, Verified};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Deployment<T>, (Deployment<S>, DeployError)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<S> {
    /// Internal helper to move to a new state.
    fn transition<T>(self, state: T) -> Deployment<T> {
        Deployment {
            context: self.context,
            target: self.target,
            healthcheck: self.healthcheck,
            health_timeout: self.health_timeout,
            started_at: self.started_at,
            state,
        }
    }

    /// Internal helper for rollback: revert to `to` and wait for health.
    async fn rollback_to(self, to: &ReleaseRecord) -> Result<Deployment<RolledBack>, DeployError> {
        tracing::warn!(
            environment = %self.context.environment,
            from = %self.context.version,
            to = %to.version,
            "Rolling back"
        );

        revert_and_verify(
            self.target.as_ref(),
            &self.context,
            to,
            self.healthcheck.as_ref(),
            self.health_timeout,
        )
        .await
        .map_err(|e| DeployError::RollbackFailed(e.to_string()))?;

        let restored = to.version.clone();
        Ok(self.transition(RolledBack {
            restored,
            rolled_back_at: Utc::now(),
        }))
    }
}

// =============================================================================
// Initialized -> PreChecked
// =============================================================================

impl Deployment<Initialized> {
    /// Run the target's pre-check. Nothing has changed yet, so a failure needs no rollback.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::PrecheckFailed` if the target rejects the deployment.
    #[must_use = "deployment state must be used"]
    pub async fn precheck(self) -> Result<Deployment<PreChecked>, DeployError> {
        self.target
            .precheck(&self.context)
            .await
            .map_err(|e| DeployError::PrecheckFailed(e.to_string()))?;
        Ok(self.transition(PreChecked))
    }
}

// =============================================================================
// PreChecked -> Applied
// =============================================================================

impl Deployment<PreChecked> {
    /// Roll the artifact out.
    ///
    /// # Errors
    ///
    /// Returns `(deployment, error)` on failure. The target may be partially
    /// changed, so the returned deployment is `Applied` and can be rolled back.
    #[must_use = "deployment state must be used"]
    pub async fn apply(self) -> TransitionResult<Applied, Applied> {
        let result = self.target.apply(&self.context).await;
        let applied = self.transition(Applied {
            applied_at: Utc::now(),
        });

        match result {
            Ok(()) => Ok(applied),
            Err(e) => Err((applied, DeployError::ApplyFailed(e.to_string()))),
        }
    }
}

// =============================================================================
// Applied -> Verified
// =============================================================================

impl Deployment<Applied> {
    /// Wait for the target to become healthy.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow rollback.
    #[must_use = "deployment state must be used"]
    pub async fn verify(self) -> TransitionResult<Verified, Applied> {
        let health = match &self.healthcheck {
            Some(healthcheck) => {
                wait_healthy(
                    self.target.as_ref(),
                    &self.context,
                    healthcheck,
                    self.health_timeout,
                )
                .await
            }
            None => Ok(()),
        };
        if let Err(e) = health {
            return Err((self, e));
        }

        let applied_at = self.state.applied_at;
        Ok(self.transition(Verified {
            applied_at,
            verified_at: Utc::now(),
        }))
    }

    /// Restore `to`, the release that ran before this deployment.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::RollbackFailed` if the revert or its health check fails.
    #[must_use = "deployment state must be used"]
    pub async fn rollback(self, to: &ReleaseRecord) -> Result<Deployment<RolledBack>, DeployError> {
        self.rollback_to(to).await
    }
}

// =============================================================================
// Verified -> Finalized
// =============================================================================

impl Deployment<Verified> {
    #[must_use = "deployment state must be used"]
    pub fn finalize(self) -> Deployment<Finalized> {
        let Verified {
            applied_at,
            verified_at,
        } = self.state;
        self.transition(Finalized {
            applied_at,
            verified_at,
            finished_at: Utc::now(),
        })
    }

    /// Restore `to`, the release that ran before this deployment.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::RollbackFailed` if the revert or its health check fails.
    #[must_use = "deployment state must be used"]
    pub async fn rollback(self, to: &ReleaseRecord) -> Result<Deployment<RolledBack>, DeployError> {
        self.rollback_to(to).await
    }
}
