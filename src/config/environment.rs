// ABOUTME: Per-environment configuration: deploy commands, health, and policies.
// ABOUTME: Policies are what the request validator and promotion gates enforce.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::time::Duration;

use super::{EnvValue, HealthcheckConfig};
use crate::types::EnvironmentName;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub name: EnvironmentName,

    /// Command run before anything changes; failure aborts the deployment.
    #[serde(default)]
    pub precheck: Option<String>,

    /// Command that rolls the artifact out.
    pub apply: String,

    /// Command that restores an earlier release. Defaults to `apply`.
    #[serde(default)]
    pub revert: Option<String>,

    #[serde(default)]
    pub healthcheck: Option<HealthcheckConfig>,

    #[serde(default, with = "humantime_serde")]
    pub health_timeout: Option<Duration>,

    /// Extra variables passed to every command.
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub approval: Option<ApprovalPolicy>,

    /// Whether a version must be deployed in the previous environment first.
    /// Unset means yes for every environment except the first.
    #[serde(default)]
    pub require_promotion: Option<bool>,

    #[serde(default = "default_true")]
    pub allow_prerelease: bool,

    #[serde(default = "default_true")]
    pub allow_floating: bool,

    #[serde(default)]
    pub require_digest: bool,

    #[serde(default)]
    pub version_pattern: Option<VersionPattern>,

    #[serde(default = "default_true")]
    pub auto_rollback: bool,
}

fn default_true() -> bool {
    true
}

impl EnvironmentConfig {
    /// Minimal environment that runs `apply` and nothing else.
    pub fn new(name: EnvironmentName, apply: impl Into<String>) -> Self {
        Self {
            name,
            precheck: None,
            apply: apply.into(),
            revert: None,
            healthcheck: None,
            health_timeout: None,
            env: HashMap::new(),
            approval: None,
            require_promotion: None,
            allow_prerelease: true,
            allow_floating: true,
            require_digest: false,
            version_pattern: None,
            auto_rollback: true,
        }
    }

    /// Command used to restore an earlier release.
    pub fn revert_command(&self) -> &str {
        self.revert.as_deref().unwrap_or(&self.apply)
    }
}

/// Sign-off required before a version may deploy to an environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalPolicy {
    #[serde(default = "default_required")]
    pub required: u32,

    /// Who may approve. Empty means anyone.
    #[serde(default)]
    pub approvers: Vec<String>,
}

fn default_required() -> u32 {
    1
}

impl ApprovalPolicy {
    pub fn allows(&self, approver: &str) -> bool {
        self.approvers.is_empty() || self.approvers.iter().any(|a| a == approver)
    }
}

/// A regex that versions must match in full.
#[derive(Debug, Clone)]
pub struct VersionPattern {
    source: String,
    anchored: Regex,
}

impl VersionPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let anchored = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            source: pattern.to_string(),
            anchored,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, version: &str) -> bool {
        self.anchored.is_match(version)
    }
}

impl<'de> Deserialize<'de> for VersionPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        VersionPattern::new(&s).map_err(serde::de::Error::custom)
    }
}
