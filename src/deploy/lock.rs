// ABOUTME: Deploy lock to prevent concurrent deployments to the same environment.
// ABOUTME: Uses atomic file creation with lock info stored under <state_dir>/locks/.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{AppName, EnvironmentName};

use super::DeployError;

/// Information about who holds a deploy lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// `<application>/<environment>` being deployed.
    pub target: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(application: &AppName, environment: &EnvironmentName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            target: format!("{application}/{environment}"),
        }
    }

    /// Check if this lock is older than `stale_after`.
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        let age = Utc::now() - self.started_at;
        age.to_std().is_ok_and(|age| age >= stale_after)
    }

    /// Path to the lock file for an application's environment.
    ///
    /// Names are DNS labels, so `@` cannot appear in either half and no two
    /// pairs share a file.
    pub fn lock_path(locks_dir: &Path, application: &AppName, environment: &EnvironmentName) -> PathBuf {
        locks_dir.join(format!("{application}@{environment}.lock"))
    }
}

/// Why an existing lock was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    Forced,
    Stale,
    Unreadable,
}

impl std::fmt::Display for BreakReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakReason::Forced => write!(f, "forced"),
            BreakReason::Stale => write!(f, "stale"),
            BreakReason::Unreadable => write!(f, "unreadable"),
        }
    }
}

/// A lock that was broken to acquire this one.
#[derive(Debug, Clone)]
pub struct BrokenLock {
    pub reason: BreakReason,
    pub previous: Option<LockInfo>,
}

/// A held deploy lock. Released by `release`, `hold_while`, or on drop.
#[derive(Debug)]
pub struct DeployLock {
    path: PathBuf,
    broken: Option<BrokenLock>,
    released: bool,
}

impl DeployLock {
    /// Acquire the deploy lock for an application's environment.
    ///
    /// Uses `create_new` for atomic lock acquisition (no TOCTOU race).
    /// Returns error if lock is already held by another process.
    /// Breaks stale or unreadable locks with a warning; `force` breaks any lock.
    pub fn acquire(
        locks_dir: &Path,
        application: &AppName,
        environment: &EnvironmentName,
        stale_after: Duration,
        force: bool,
    ) -> Result<Self, DeployError> {
        std::fs::create_dir_all(locks_dir).map_err(|e| {
            DeployError::lock_error(format!("failed to create lock directory: {e}"))
        })?;

        let path = LockInfo::lock_path(locks_dir, application, environment);
        let info = LockInfo::new(application, environment);
        let lock_json = serde_json::to_vec(&info)
            .map_err(|e| DeployError::lock_error(format!("failed to serialize lock: {e}")))?;

        if try_create(&path, &lock_json)? {
            return Ok(Self {
                path,
                broken: None,
                released: false,
            });
        }

        // Lock acquisition failed - check if existing lock should be broken
        let broken = check_existing_lock(&path, stale_after, force)?;

        tracing::debug!("Removing {} lock at {}", broken.reason, path.display());
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(DeployError::lock_error(format!("failed to break lock: {e}"))),
        }

        if !try_create(&path, &lock_json)? {
            return Err(DeployError::lock_error(
                "lock acquired by another process during break",
            ));
        }

        Ok(Self {
            path,
            broken: Some(broken),
            released: false,
        })
    }

    /// The lock that had to be broken to acquire this one, if any.
    pub fn broken(&self) -> Option<&BrokenLock> {
        self.broken.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), DeployError> {
        self.released = true;
        remove_lock_file(&self.path)
    }

    /// Run `fut` while holding the lock, releasing it on success, error, or panic.
    pub async fn hold_while<F: Future>(self, fut: F) -> F::Output {
        let result = AssertUnwindSafe(fut).catch_unwind().await;

        if let Err(e) = self.release() {
            tracing::warn!("Failed to release deploy lock: {}", e);
        }

        match result {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for DeployLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = remove_lock_file(&self.path);
        }
    }
}

/// Create the lock file if absent. Returns false if it already exists.
fn try_create(path: &Path, contents: &[u8]) -> Result<bool, DeployError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(contents)
                .map_err(|e| DeployError::lock_error(format!("failed to write lock: {e}")))?;
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(DeployError::lock_error(format!("failed to acquire lock: {e}"))),
    }
}

/// Decide whether an existing lock may be broken (stale, forced, or unreadable).
fn check_existing_lock(
    path: &Path,
    stale_after: Duration,
    force: bool,
) -> Result<BrokenLock, DeployError> {
    let existing = std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok());

    let Some(existing) = existing else {
        tracing::warn!("Lock info unreadable, breaking lock");
        return Ok(BrokenLock {
            reason: BreakReason::Unreadable,
            previous: None,
        });
    };

    let reason = if force {
        tracing::warn!(
            "Breaking lock held by {} (pid {}) since {}",
            existing.holder,
            existing.pid,
            existing.started_at
        );
        BreakReason::Forced
    } else if existing.is_stale(stale_after) {
        tracing::warn!(
            "Auto-breaking stale lock held by {} (pid {}) since {}",
            existing.holder,
            existing.pid,
            existing.started_at
        );
        BreakReason::Stale
    } else {
        return Err(DeployError::lock_held(
            existing.holder,
            existing.pid,
            existing.started_at,
        ));
    };

    Ok(BrokenLock {
        reason,
        previous: Some(existing),
    })
}

fn remove_lock_file(path: &Path) -> Result<(), DeployError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DeployError::lock_error(format!("failed to release lock: {e}"))),
    }
}
