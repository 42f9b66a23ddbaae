// ABOUTME: Error types for deployment operations.
// ABOUTME: Covers pre-check, apply, health check, rollback, and lock failures.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Errors that can occur during deployment state transitions.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Pre-check rejected the deployment before anything changed.
    #[error("pre-check failed: {0}")]
    PrecheckFailed(String),

    /// Applying the artifact failed.
    #[error("apply failed: {0}")]
    ApplyFailed(String),

    /// Health check failed.
    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    /// Health check timed out.
    #[error("health check timed out after {0:?}")]
    HealthCheckTimeout(Duration),

    /// Rollback failed.
    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    /// Another deployment holds the lock.
    #[error("deploy lock held by {} (pid {}) since {}", .0.holder, .0.pid, .0.started_at)]
    LockHeld(LockHolderInfo),

    /// Lock could not be acquired or released.
    #[error("deploy lock error: {0}")]
    LockError(String),
}

/// Who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    Precheck,
    Apply,
    HealthCheck,
    Rollback,
    Lock,
}

impl DeployError {
    pub fn lock_held(holder: String, pid: u32, started_at: DateTime<Utc>) -> Self {
        DeployError::LockHeld(LockHolderInfo {
            holder,
            pid,
            started_at,
        })
    }

    pub fn lock_error(message: impl Into<String>) -> Self {
        DeployError::LockError(message.into())
    }

    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::PrecheckFailed(_) => DeployErrorKind::Precheck,
            DeployError::ApplyFailed(_) => DeployErrorKind::Apply,
            DeployError::HealthCheckFailed(_) | DeployError::HealthCheckTimeout(_) => {
                DeployErrorKind::HealthCheck
            }
            DeployError::RollbackFailed(_) => DeployErrorKind::Rollback,
            DeployError::LockHeld(_) | DeployError::LockError(_) => DeployErrorKind::Lock,
        }
    }

    /// Returns lock holder details if this is a held-lock error.
    pub fn lock_holder_info(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::LockHeld(info) => Some(info),
            _ => None,
        }
    }

    /// Whether the target may have been changed when this error occurred.
    pub fn target_changed(&self) -> bool {
        matches!(
            self.kind(),
            DeployErrorKind::Apply | DeployErrorKind::HealthCheck
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_errors_share_a_kind() {
        assert_eq!(
            DeployError::HealthCheckFailed("x".into()).kind(),
            DeployErrorKind::HealthCheck
        );
        assert_eq!(
            DeployError::HealthCheckTimeout(Duration::from_secs(5)).kind(),
            DeployErrorKind::HealthCheck
        );
    }

    #[test]
    fn lock_held_exposes_holder() {
        let started_at = Utc::now();
        let err = DeployError::lock_held("ci-runner".to_string(), 42, started_at);
        assert_eq!(err.kind(), DeployErrorKind::Lock);
        let info = err.lock_holder_info().unwrap();
        assert_eq!(info.holder, "ci-runner");
        assert_eq!(info.pid, 42);
        assert!(err.to_string().contains("ci-runner (pid 42)"));
    }

    #[test]
    fn precheck_failure_leaves_target_untouched() {
        assert!(!DeployError::PrecheckFailed("x".into()).target_changed());
        assert!(DeployError::ApplyFailed("x".into()).target_changed());
    }
}
