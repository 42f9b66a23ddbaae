// ABOUTME: Application-wide error types for shipwright.
// ABOUTME: Uses thiserror for ergonomic error handling; module errors convert in via #[from].

use std::path::PathBuf;
use thiserror::Error;

use crate::audit::AuditError;
use crate::deploy::DeployError;
use crate::promotion::{PromotionError, StoreError};
use crate::rollback::RollbackError;
use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} is the first environment; deploy to it directly")]
    NothingToPromoteFrom(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Rollback(#[from] RollbackError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Hook(String),

    #[error("deployment of {version} to {environment} failed: {reason}{}", rolled_back_note(.rolled_back))]
    DeploymentFailed {
        environment: String,
        version: String,
        reason: String,
        rolled_back: bool,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn rolled_back_note(rolled_back: &bool) -> &'static str {
    if *rolled_back { " (rolled back)" } else { "" }
}

pub type Result<T> = std::result::Result<T, Error>;
