// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during deployment operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn lock_broken(message: impl Into<String>) -> Self {
        Self::new(WarningKind::LockBroken, message)
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Hook, message)
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Notification, message)
    }

    pub fn audit(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Audit, message)
    }

    pub fn ledger(message: impl Into<String>) -> Self {
        Self::new(WarningKind::Ledger, message)
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A stale or forced lock was broken to proceed.
    LockBroken,
    /// A non-fatal hook failed.
    Hook,
    /// A notifier could not deliver.
    Notification,
    /// An event could not be written to the audit log.
    Audit,
    /// The ledger refused a bookkeeping step after the target had already changed.
    Ledger,
}
