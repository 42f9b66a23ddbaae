// ABOUTME: Deployment orchestration using the type state pattern.
// ABOUTME: Exports state markers, the Deployment struct, targets, and the deploy lock.

mod deployment;
mod error;
mod health;
mod lock;
mod state;
mod target;
mod transitions;

pub use deployment::Deployment;
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use health::wait_healthy;
pub use lock::{BreakReason, BrokenLock, DeployLock, LockInfo};
pub use state::{Applied, Finalized, Initialized, PreChecked, RolledBack, Verified};
pub use target::{
    CommandFailedSnafu, DeployContext, DeployTarget, RejectedSnafu, ShellTarget, ShellTargets,
    SpawnSnafu, TargetError, TargetProvider,
};
pub use transitions::TransitionResult;
