// ABOUTME: Error types for promotion gates and ledger persistence.
// ABOUTME: PromotionError is a policy refusal; StoreError is an I/O problem.

use std::path::PathBuf;

use super::Stage;

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    /// The version has not reached the previous environment.
    #[error("{version} must be deployed to {required} before {environment}")]
    NotPromoted {
        version: String,
        environment: String,
        required: String,
    },

    #[error("{version} needs {need} approval(s) for {environment}, has {have}")]
    ApprovalRequired {
        environment: String,
        version: String,
        have: usize,
        need: usize,
    },

    #[error("{approver} is not allowed to approve deployments to {environment}")]
    UnauthorizedApprover {
        approver: String,
        environment: String,
    },

    #[error("{approver} has already approved {version} for {environment}")]
    DuplicateApproval {
        approver: String,
        environment: String,
        version: String,
    },

    #[error("{environment} has no approval gate")]
    NoApprovalGate { environment: String },

    #[error("{version} is not awaiting approval in {environment} (stage: {stage})")]
    NotAwaitingApproval {
        environment: String,
        version: String,
        stage: Stage,
    },

    #[error("invalid promotion transition: {from} -> {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("no promotion of {version} to {environment}")]
    UnknownPromotion {
        environment: String,
        version: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt ledger {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
