// ABOUTME: Hooks system for deployment lifecycle events.
// ABOUTME: Discovers and executes scripts at pre-deploy, post-deploy, on-error and post-rollback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::deploy::DeployContext;

/// Hook execution points in the deployment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before deployment starts. Failure aborts deployment.
    PreDeploy,
    /// After successful deployment. Failure logs warning.
    PostDeploy,
    /// On deployment failure. Failure logs warning.
    OnError,
    /// After a rollback completes. Failure logs warning.
    PostRollback,
}

impl HookPoint {
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreDeploy => "pre-deploy",
            HookPoint::PostDeploy => "post-deploy",
            HookPoint::OnError => "on-error",
            HookPoint::PostRollback => "post-rollback",
        }
    }

    /// Whether failure at this hook point should abort deployment.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreDeploy)
    }
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub deploy: DeployContext,
    /// Set for `on-error`.
    pub error: Option<String>,
}

impl HookContext {
    pub fn new(deploy: &DeployContext) -> Self {
        Self {
            deploy: deploy.clone(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn to_env(&self) -> HashMap<String, String> {
        let mut env = self.deploy.to_env();
        if let Some(ref error) = self.error {
            env.insert("SHIPWRIGHT_ERROR".to_string(), error.clone());
        }
        env
    }
}

/// Result of running a hook.
#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HookResult {
    /// Short failure description for warnings and errors.
    pub fn describe_failure(&self, point: HookPoint) -> String {
        let stderr = self.stderr.trim();
        match (self.exit_code, stderr.is_empty()) {
            (Some(code), true) => format!("{} hook exited with code {code}", point.filename()),
            (Some(code), false) => {
                format!("{} hook exited with code {code}: {stderr}", point.filename())
            }
            (None, _) => format!("{} hook failed: {stderr}", point.filename()),
        }
    }
}

/// Discovers and runs hooks from a project directory.
#[derive(Debug, Clone)]
pub struct HookRunner {
    project_dir: PathBuf,
    hooks_dir: PathBuf,
}

impl HookRunner {
    /// Hooks live in `<project_dir>/.shipwright/hooks`.
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            hooks_dir: project_dir.join(".shipwright").join("hooks"),
        }
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run a hook if it exists.
    ///
    /// Returns None if the hook doesn't exist, or Some(HookResult) if it was run.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let hook_path = self.hook_path(point);

        if !hook_path.is_file() {
            return None;
        }

        tracing::info!("Running {} hook: {}", point.filename(), hook_path.display());

        let output = Command::new(&hook_path)
            .current_dir(&self.project_dir)
            .envs(context.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                let result = HookResult {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if result.success {
                    tracing::info!("{} hook completed successfully", point.filename());
                } else {
                    tracing::warn!(
                        "{} hook failed with exit code {:?}",
                        point.filename(),
                        result.exit_code
                    );
                }

                Some(result)
            }
            Err(e) => {
                tracing::error!("Failed to execute {} hook: {}", point.filename(), e);
                Some(HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                })
            }
        }
    }
}
