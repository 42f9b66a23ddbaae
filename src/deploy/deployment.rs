// ABOUTME: Generic deployment struct parameterized by state marker.
// ABOUTME: State types carry their own data for compile-time guarantees.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HealthcheckConfig;
use crate::types::{ArtifactRef, DeploymentId, EnvironmentName, Version};

use super::state::{Applied, Finalized, Initialized, RolledBack, Verified};
use super::target::{DeployContext, DeployTarget};

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries state-specific data (like the time
/// the artifact was applied) directly in the state type, so a finalized
/// deployment always has every timestamp.
pub struct Deployment<S> {
    pub(crate) context: DeployContext,
    pub(crate) target: Arc<dyn DeployTarget>,
    pub(crate) healthcheck: Option<HealthcheckConfig>,
    pub(crate) health_timeout: Duration,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) state: S,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Deployment<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("deployment_id", &self.context.deployment_id)
            .field("environment", &self.context.environment)
            .field("version", &self.context.version)
            .field("state", &self.state)
            .finish()
    }
}

impl Deployment<Initialized> {
    /// Create a deployment. With no healthcheck, `verify()` passes immediately.
    pub fn new(
        context: DeployContext,
        target: Arc<dyn DeployTarget>,
        healthcheck: Option<HealthcheckConfig>,
        health_timeout: Duration,
    ) -> Self {
        Deployment {
            context,
            target,
            healthcheck,
            health_timeout,
            started_at: Utc::now(),
            state: Initialized,
        }
    }
}

impl<S> Deployment<S> {
    pub fn context(&self) -> &DeployContext {
        &self.context
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.context.deployment_id
    }

    pub fn environment(&self) -> &EnvironmentName {
        &self.context.environment
    }

    pub fn version(&self) -> &Version {
        &self.context.version
    }

    pub fn artifact(&self) -> &ArtifactRef {
        &self.context.artifact
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Deployment<Applied> {
    pub fn applied_at(&self) -> DateTime<Utc> {
        self.state.applied_at
    }
}

impl Deployment<Verified> {
    pub fn applied_at(&self) -> DateTime<Utc> {
        self.state.applied_at
    }

    pub fn verified_at(&self) -> DateTime<Utc> {
        self.state.verified_at
    }
}

impl Deployment<Finalized> {
    pub fn applied_at(&self) -> DateTime<Utc> {
        self.state.applied_at
    }

    pub fn verified_at(&self) -> DateTime<Utc> {
        self.state.verified_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.state.finished_at
    }

    /// Wall-clock time from creation to finalize.
    pub fn elapsed(&self) -> chrono::Duration {
        self.state.finished_at - self.started_at
    }
}

impl Deployment<RolledBack> {
    /// Version running after the rollback.
    pub fn restored_version(&self) -> &Version {
        &self.state.restored
    }

    pub fn rolled_back_at(&self) -> DateTime<Utc> {
        self.state.rolled_back_at
    }
}
