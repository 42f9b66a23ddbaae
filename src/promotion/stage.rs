// ABOUTME: Promotion stages and the table of legal moves between them.
// ABOUTME: Every stage change goes through validate_transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::PromotionError;

/// Where one version stands in one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    AwaitingApproval,
    Approved,
    Deploying,
    Deployed,
    Failed,
    RolledBack,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::AwaitingApproval => "awaiting_approval",
            Stage::Approved => "approved",
            Stage::Deploying => "deploying",
            Stage::Deployed => "deployed",
            Stage::Failed => "failed",
            Stage::RolledBack => "rolled_back",
        }
    }

    /// Stages that have not reached a deployment attempt yet.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Stage::Pending | Stage::AwaitingApproval | Stage::Approved
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn allowed_transitions(from: Stage) -> &'static [Stage] {
    use Stage::*;
    match from {
        Pending => &[AwaitingApproval, Deploying],
        AwaitingApproval => &[Approved],
        Approved => &[Deploying],
        Deploying => &[Deployed, Failed],
        Deployed => &[RolledBack, Deploying],
        Failed => &[Deploying],
        RolledBack => &[Deploying],
    }
}

pub fn validate_transition(from: Stage, to: Stage) -> Result<(), PromotionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PromotionError::InvalidTransition { from, to })
    }
}

/// One recorded stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub reason: String,
    pub at: DateTime<Utc>,
}
