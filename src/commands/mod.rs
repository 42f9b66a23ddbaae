// ABOUTME: Command module aggregator for the shipwright CLI.
// ABOUTME: Each handler drives the DeploymentManager and reports through Output.

mod approve;
mod deploy;
mod rollback;
mod status;

pub use approve::approve;
pub use deploy::{deploy, promote, validate};
pub use rollback::rollback;
pub use status::{history, status, verify_audit};

use shipwright::diagnostics::Warning;
use shipwright::output::Output;

/// Emit collected warnings.
fn emit_warnings(output: &Output, warnings: &[Warning]) {
    for warning in warnings {
        output.warning(warning);
    }
}
