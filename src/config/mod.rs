// ABOUTME: Configuration types and parsing for shipwright.yml.
// ABOUTME: Declares the application, its artifact template, and the ordered environment chain.

mod deserialize;
mod env_value;
mod environment;
mod healthcheck;
mod init;
mod notifications;

pub use env_value::{EnvValue, resolve_env_map};
pub use environment::{ApprovalPolicy, EnvironmentConfig, VersionPattern};
pub use healthcheck::HealthcheckConfig;
pub use init::{init_config, template_yaml};
pub use notifications::{NotificationsConfig, SlackConfig};

use crate::error::{Error, Result};
use crate::types::{AppName, ArtifactRef, EnvironmentName, Version};
use deserialize::deserialize_environments;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "shipwright.yml";
pub const CONFIG_FILENAME_ALT: &str = "shipwright.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".shipwright/config.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub application: AppName,

    /// Artifact template with a `{version}` placeholder.
    #[serde(default)]
    pub artifact: Option<String>,

    /// Where the ledger, locks, and audit log live. Relative to the project directory.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(deserialize_with = "deserialize_environments")]
    pub environments: NonEmpty<EnvironmentConfig>,

    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// Locks older than this are considered abandoned.
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: default_stale_after(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".shipwright/state")
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(60 * 60)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Cross-field checks serde cannot express.
    fn check(&self) -> Result<()> {
        if let Some(template) = &self.artifact {
            let sample = Version::parse("0.0.0").map_err(|e| Error::InvalidConfig(e.to_string()))?;
            ArtifactRef::render_template(template, &sample).map_err(|e| {
                Error::InvalidConfig(format!("artifact template '{template}': {e}"))
            })?;
        }

        for env in &self.environments {
            if env.apply.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "environment {}: apply command cannot be empty",
                    env.name
                )));
            }
            if let Some(policy) = &env.approval {
                if policy.required == 0 {
                    return Err(Error::InvalidConfig(format!(
                        "environment {}: approval.required must be at least 1",
                        env.name
                    )));
                }
                if !policy.approvers.is_empty() && policy.required as usize > policy.approvers.len()
                {
                    return Err(Error::InvalidConfig(format!(
                        "environment {}: approval.required ({}) exceeds number of approvers ({})",
                        env.name,
                        policy.required,
                        policy.approvers.len()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentConfig> {
        self.environments
            .iter()
            .find(|e| e.name.as_str() == name)
            .ok_or_else(|| Error::UnknownEnvironment(name.to_string()))
    }

    /// Index of an environment in the promotion chain.
    pub fn position(&self, name: &EnvironmentName) -> Option<usize> {
        self.environments.iter().position(|e| &e.name == name)
    }

    pub fn previous_environment(&self, name: &EnvironmentName) -> Option<&EnvironmentConfig> {
        match self.position(name) {
            Some(0) | None => None,
            Some(i) => self.environments.get(i - 1),
        }
    }

    pub fn next_environment(&self, name: &EnvironmentName) -> Option<&EnvironmentConfig> {
        self.position(name).and_then(|i| self.environments.get(i + 1))
    }

    /// Whether a version must already be deployed upstream before it may enter `env`.
    /// The first environment has nothing upstream.
    pub fn requires_promotion(&self, env: &EnvironmentConfig) -> bool {
        match self.position(&env.name) {
            Some(0) | None => false,
            Some(_) => env.require_promotion.unwrap_or(true),
        }
    }

    pub fn health_timeout_for(&self, env: &EnvironmentConfig) -> Duration {
        env.health_timeout.unwrap_or(self.health_timeout)
    }

    /// Resolve the state directory against the project directory.
    pub fn state_dir(&self, project_dir: &Path) -> PathBuf {
        if self.state_dir.is_absolute() {
            self.state_dir.clone()
        } else {
            project_dir.join(&self.state_dir)
        }
    }

    /// The starter config written by `shipwright init`.
    pub fn template() -> Result<Self> {
        Self::from_yaml(&init::template_yaml(
            init::DEFAULT_APPLICATION,
            init::DEFAULT_ARTIFACT,
        ))
    }
}
