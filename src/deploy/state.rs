// ABOUTME: Deployment state marker types for the type state pattern.
// ABOUTME: States carry the timestamps collected so far, so later states cannot lack them.

use chrono::{DateTime, Utc};

use crate::types::Version;

/// Initial state: context resolved, nothing touched yet.
/// Available actions: `precheck()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Pre-check passed: the environment accepts the deployment.
/// Available actions: `apply()`
#[derive(Debug, Clone, Copy, Default)]
pub struct PreChecked;

/// Apply ran. If it failed the target may be partially changed.
/// Available actions: `verify()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct Applied {
    pub(crate) applied_at: DateTime<Utc>,
}

/// Health verified.
/// Available actions: `finalize()`, `rollback()`
#[derive(Debug, Clone, Copy)]
pub struct Verified {
    pub(crate) applied_at: DateTime<Utc>,
    pub(crate) verified_at: DateTime<Utc>,
}

/// Finalized: deployment finished.
#[derive(Debug, Clone, Copy)]
pub struct Finalized {
    pub(crate) applied_at: DateTime<Utc>,
    pub(crate) verified_at: DateTime<Utc>,
    pub(crate) finished_at: DateTime<Utc>,
}

/// Rolled back: the environment runs an earlier release again.
#[derive(Debug, Clone)]
pub struct RolledBack {
    pub(crate) restored: Version,
    pub(crate) rolled_back_at: DateTime<Utc>,
}
