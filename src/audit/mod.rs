// ABOUTME: Tamper-evident audit trail of deployment activity.
// ABOUTME: Each event's hash covers its fields and the previous hash, forming a chain.

mod file;
mod memory;

pub use file::FileAuditLog;
pub use memory::MemoryAuditLog;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{AppName, EnvironmentName, EventId, Version};

/// `prev_hash` of the first event.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("audit log line {line} is not a valid event: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },

    #[error("audit log integrity violation at entry {index}")]
    IntegrityViolation { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PromotionOpened,
    ApprovalGranted,
    DeployStarted,
    DeploySucceeded,
    DeployFailed,
    RollbackStarted,
    RollbackSucceeded,
    RollbackFailed,
    LockBroken,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::PromotionOpened => "promotion_opened",
            AuditAction::ApprovalGranted => "approval_granted",
            AuditAction::DeployStarted => "deploy_started",
            AuditAction::DeploySucceeded => "deploy_succeeded",
            AuditAction::DeployFailed => "deploy_failed",
            AuditAction::RollbackStarted => "rollback_started",
            AuditAction::RollbackSucceeded => "rollback_succeeded",
            AuditAction::RollbackFailed => "rollback_failed",
            AuditAction::LockBroken => "lock_broken",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened, before it is sealed into the chain.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub application: AppName,
    pub environment: Option<EnvironmentName>,
    pub version: Option<Version>,
    pub action: AuditAction,
    pub actor: String,
    pub detail: String,
}

impl AuditEntry {
    pub fn new(application: &AppName, action: AuditAction, actor: &str) -> Self {
        Self {
            application: application.clone(),
            environment: None,
            version: None,
            action,
            actor: actor.to_string(),
            detail: String::new(),
        }
    }

    pub fn environment(mut self, environment: &EnvironmentName) -> Self {
        self.environment = Some(environment.clone());
        self
    }

    pub fn version(mut self, version: &Version) -> Self {
        self.version = Some(version.clone());
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Seal the entry onto a chain whose last hash is `prev_hash`.
    pub fn seal(self, prev_hash: &str) -> AuditEvent {
        let mut event = AuditEvent {
            id: EventId::generate(),
            at: Utc::now(),
            application: self.application,
            environment: self.environment,
            version: self.version,
            action: self.action,
            actor: self.actor,
            detail: self.detail,
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        event.hash = event.compute_hash();
        event
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub at: DateTime<Utc>,
    pub application: AppName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    pub action: AuditAction,
    pub actor: String,
    #[serde(default)]
    pub detail: String,
    pub prev_hash: String,
    pub hash: String,
}

impl AuditEvent {
    pub fn compute_hash(&self) -> String {
        let at = self.at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        for field in [
            self.id.as_str(),
            at.as_str(),
            self.application.as_str(),
            self.environment.as_ref().map_or("", |e| e.as_str()),
            self.version.as_ref().map_or("", |v| v.as_str()),
            self.action.as_str(),
            self.actor.as_str(),
            self.detail.as_str(),
        ] {
            hasher.update([0]);
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Hash of the last event, or the genesis hash for an empty chain.
pub fn chain_head(events: &[AuditEvent]) -> &str {
    events.last().map_or(GENESIS_HASH, |e| e.hash.as_str())
}

/// Check every link of the chain. Reports the first broken entry.
pub fn verify_chain(events: &[AuditEvent]) -> Result<(), AuditError> {
    let mut prev = GENESIS_HASH;
    for (index, event) in events.iter().enumerate() {
        if event.prev_hash != prev || event.hash != event.compute_hash() {
            return Err(AuditError::IntegrityViolation { index });
        }
        prev = &event.hash;
    }
    Ok(())
}

/// Where audit events go.
pub trait AuditSink: Send + Sync {
    /// Seal `entry` onto the chain and store it.
    fn append(&self, entry: AuditEntry) -> Result<AuditEvent, AuditError>;

    /// All events, oldest first.
    fn events(&self) -> Result<Vec<AuditEvent>, AuditError>;

    /// Verify the whole chain, returning the number of events checked.
    fn verify(&self) -> Result<usize, AuditError> {
        let events = self.events()?;
        verify_chain(&events)?;
        Ok(events.len())
    }
}
