// ABOUTME: Promotion state machine: tracks each version through the environment chain.
// ABOUTME: Enforces ordering and approval gates and keeps per-environment release history.

mod error;
mod ledger;
mod stage;
mod store;

pub use error::{PromotionError, StoreError};
pub use ledger::{
    Approval, ApprovalStatus, Ledger, Promotion, ReleaseRecord, ReleaseStatus,
};
pub use stage::{Stage, StageTransition, allowed_transitions, validate_transition};
pub use store::LedgerStore;
