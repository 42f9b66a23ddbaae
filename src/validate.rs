// ABOUTME: Deployment request validation against per-environment policy.
// ABOUTME: Collects every violation instead of stopping at the first one.

use std::fmt;
use thiserror::Error;

use crate::config::Config;
use crate::types::{ArtifactRef, EnvironmentName, ParseArtifactError, Version, VersionError};

/// A deployment request as it arrives from the CLI or an API caller.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRequest {
    pub environment: String,
    pub version: String,
    /// Explicit artifact. When absent the config's artifact template is rendered.
    pub artifact: Option<String>,
}

impl DeploymentRequest {
    pub fn new(environment: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            version: version.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifact = Some(artifact.into());
        self
    }
}

/// One reason a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    UnknownEnvironment(String),
    InvalidVersion(VersionError),
    InvalidArtifact(ParseArtifactError),
    MissingArtifact,
    PrereleaseNotAllowed { environment: String, version: String },
    FloatingVersionNotAllowed { environment: String, value: String },
    VersionPatternMismatch { version: String, pattern: String },
    DigestRequired { environment: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnknownEnvironment(env) => write!(f, "unknown environment: {env}"),
            Violation::InvalidVersion(e) => write!(f, "{e}"),
            Violation::InvalidArtifact(e) => write!(f, "{e}"),
            Violation::MissingArtifact => {
                write!(f, "no artifact given and no artifact template configured")
            }
            Violation::PrereleaseNotAllowed {
                environment,
                version,
            } => write!(f, "prerelease {version} is not allowed in {environment}"),
            Violation::FloatingVersionNotAllowed { environment, value } => {
                write!(f, "floating tag '{value}' is not allowed in {environment}")
            }
            Violation::VersionPatternMismatch { version, pattern } => {
                write!(f, "version {version} does not match pattern '{pattern}'")
            }
            Violation::DigestRequired { environment } => {
                write!(f, "{environment} requires an image pinned by digest")
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid deployment request: {}", join(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn contains(&self, predicate: impl Fn(&Violation) -> bool) -> bool {
        self.violations.iter().any(predicate)
    }
}

/// A request that passed validation. Only `validate` can build one.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    environment: EnvironmentName,
    version: Version,
    artifact: ArtifactRef,
}

impl ValidatedRequest {
    pub fn environment(&self) -> &EnvironmentName {
        &self.environment
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn artifact(&self) -> &ArtifactRef {
        &self.artifact
    }
}

pub fn validate(
    request: &DeploymentRequest,
    config: &Config,
) -> Result<ValidatedRequest, ValidationError> {
    let mut violations = Vec::new();

    let env = config.environment(request.environment.trim()).ok();
    if env.is_none() {
        violations.push(Violation::UnknownEnvironment(request.environment.clone()));
    }

    let version = Version::parse(&request.version)
        .map_err(|e| violations.push(Violation::InvalidVersion(e)))
        .ok();

    let artifact = match (&request.artifact, &config.artifact) {
        (Some(explicit), _) => ArtifactRef::parse(explicit)
            .map_err(|e| violations.push(Violation::InvalidArtifact(e)))
            .ok(),
        (None, Some(template)) => version.as_ref().and_then(|v| {
            ArtifactRef::render_template(template, v)
                .map_err(|e| violations.push(Violation::InvalidArtifact(e)))
                .ok()
        }),
        (None, None) => {
            violations.push(Violation::MissingArtifact);
            None
        }
    };

    if let Some(env) = env {
        let environment = env.name.to_string();

        if let Some(version) = &version {
            if !env.allow_prerelease && version.is_prerelease() {
                violations.push(Violation::PrereleaseNotAllowed {
                    environment: environment.clone(),
                    version: version.to_string(),
                });
            }
            if !env.allow_floating && version.is_floating() {
                violations.push(Violation::FloatingVersionNotAllowed {
                    environment: environment.clone(),
                    value: version.to_string(),
                });
            }
            if let Some(pattern) = &env.version_pattern
                && !pattern.matches(version.as_str())
            {
                violations.push(Violation::VersionPatternMismatch {
                    version: version.to_string(),
                    pattern: pattern.as_str().to_string(),
                });
            }
        }

        if let Some(artifact) = &artifact {
            let version_already_flagged = version.as_ref().is_some_and(|v| v.is_floating());
            if !env.allow_floating && artifact.is_floating() && !version_already_flagged {
                violations.push(Violation::FloatingVersionNotAllowed {
                    environment: environment.clone(),
                    value: artifact.to_string(),
                });
            }
            if env.require_digest && artifact.digest().is_none() {
                violations.push(Violation::DigestRequired { environment });
            }
        }
    }

    match (env, version, artifact) {
        (Some(env), Some(version), Some(artifact)) if violations.is_empty() => {
            tracing::debug!(
                environment = %env.name,
                %version,
                %artifact,
                "Deployment request validated"
            );
            Ok(ValidatedRequest {
                environment: env.name.clone(),
                version,
                artifact,
            })
        }
        _ => Err(ValidationError { violations }),
    }
}
