// ABOUTME: The seam between shipwright and whatever actually runs the application.
// ABOUTME: DeployTarget is the trait; ShellTarget runs the environment's configured commands.

use async_trait::async_trait;
use snafu::{ResultExt, Snafu};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use crate::config::EnvironmentConfig;
use crate::promotion::ReleaseRecord;
use crate::types::{AppName, ArtifactRef, DeploymentId, EnvironmentName, Version};

/// Everything a target needs to know about the deployment in flight.
#[derive(Debug, Clone)]
pub struct DeployContext {
    pub application: AppName,
    pub environment: EnvironmentName,
    pub version: Version,
    pub artifact: ArtifactRef,
    pub deployment_id: DeploymentId,
    pub actor: String,
    /// Version running before this deployment, if any.
    pub previous_version: Option<Version>,
    /// Resolved `env` entries from the environment config.
    pub env: HashMap<String, String>,
}

impl DeployContext {
    /// Variables exported to commands and hooks.
    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.insert(
            "SHIPWRIGHT_APPLICATION".to_string(),
            self.application.to_string(),
        );
        env.insert(
            "SHIPWRIGHT_ENVIRONMENT".to_string(),
            self.environment.to_string(),
        );
        env.insert("SHIPWRIGHT_VERSION".to_string(), self.version.to_string());
        env.insert("SHIPWRIGHT_ARTIFACT".to_string(), self.artifact.to_string());
        env.insert(
            "SHIPWRIGHT_DEPLOYMENT_ID".to_string(),
            self.deployment_id.to_string(),
        );
        env.insert("SHIPWRIGHT_ACTOR".to_string(), self.actor.clone());
        if let Some(ref prev) = self.previous_version {
            env.insert("SHIPWRIGHT_PREVIOUS_VERSION".to_string(), prev.to_string());
        }
        env
    }

    /// Context for restoring `release`: its version and artifact, with the
    /// version being replaced as the previous one.
    pub fn reverting_to(&self, release: &ReleaseRecord) -> DeployContext {
        DeployContext {
            version: release.version.clone(),
            artifact: release.artifact.clone(),
            previous_version: Some(self.version.clone()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TargetError {
    #[snafu(display("failed to run '{command}': {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[snafu(display("'{command}' {}: {}", describe_exit(code), stderr.trim()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("{message}"))]
    Rejected { message: String },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

/// Operations a deployment performs against an environment.
#[async_trait]
pub trait DeployTarget: Send + Sync {
    /// Check that the environment can take the deployment. Nothing may change yet.
    async fn precheck(&self, ctx: &DeployContext) -> Result<(), TargetError>;

    /// Roll the artifact out.
    async fn apply(&self, ctx: &DeployContext) -> Result<(), TargetError>;

    /// One health probe. `Ok(false)` means reachable but unhealthy.
    async fn health_check(&self, ctx: &DeployContext) -> Result<bool, TargetError>;

    /// Restore an earlier release.
    async fn revert(&self, ctx: &DeployContext, to: &ReleaseRecord) -> Result<(), TargetError>;
}

/// Builds the target for an environment.
pub trait TargetProvider: Send + Sync {
    fn target(&self, env: &EnvironmentConfig) -> Arc<dyn DeployTarget>;
}

/// Provides a `ShellTarget` per environment, running commands in the project directory.
#[derive(Debug, Clone)]
pub struct ShellTargets {
    project_dir: PathBuf,
}

impl ShellTargets {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }
}

impl TargetProvider for ShellTargets {
    fn target(&self, env: &EnvironmentConfig) -> Arc<dyn DeployTarget> {
        Arc::new(ShellTarget::new(env, &self.project_dir))
    }
}

/// Runs the environment's `precheck`, `apply`, `revert` and healthcheck commands via `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellTarget {
    precheck: Option<String>,
    apply: String,
    revert: String,
    healthcheck: Option<String>,
    workdir: PathBuf,
}

impl ShellTarget {
    pub fn new(env: &EnvironmentConfig, workdir: &Path) -> Self {
        Self {
            precheck: env.precheck.clone(),
            apply: env.apply.clone(),
            revert: env.revert_command().to_string(),
            healthcheck: env.healthcheck.as_ref().map(|hc| hc.cmd.clone()),
            workdir: workdir.to_path_buf(),
        }
    }

    async fn run(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<std::process::Output, TargetError> {
        tracing::debug!("Running: {}", command);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context(SpawnSnafu { command })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!("{}", stdout.trim_end());
        }
        Ok(output)
    }

    async fn run_checked(
        &self,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), TargetError> {
        let output = self.run(command, env).await?;
        if !output.status.success() {
            return CommandFailedSnafu {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr),
            }
            .fail();
        }
        Ok(())
    }
}

#[async_trait]
impl DeployTarget for ShellTarget {
    async fn precheck(&self, ctx: &DeployContext) -> Result<(), TargetError> {
        match &self.precheck {
            Some(cmd) => self.run_checked(cmd, &ctx.to_env()).await,
            None => Ok(()),
        }
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), TargetError> {
        self.run_checked(&self.apply, &ctx.to_env()).await
    }

    async fn health_check(&self, ctx: &DeployContext) -> Result<bool, TargetError> {
        match &self.healthcheck {
            Some(cmd) => Ok(self.run(cmd, &ctx.to_env()).await?.status.success()),
            None => Ok(true),
        }
    }

    async fn revert(&self, ctx: &DeployContext, to: &ReleaseRecord) -> Result<(), TargetError> {
        self.run_checked(&self.revert, &ctx.reverting_to(to).to_env())
            .await
    }
}
