// ABOUTME: Rollback command implementation.
// ABOUTME: Restores an earlier release of one environment through the manager.

use shipwright::error::Result;
use shipwright::manager::{DeployOptions, DeploymentManager};
use shipwright::output::Output;

use super::emit_warnings;

/// Roll `environment` back to `to`, or to the release before the current one.
pub async fn rollback(
    manager: &DeploymentManager,
    environment: &str,
    to: Option<&str>,
    opts: &DeployOptions,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Rolling back {} in {}",
        manager.config().application,
        environment
    ));

    let report = manager.rollback(environment, to, opts).await?;
    emit_warnings(&output, &report.warnings);

    output.report(
        "rolled_back",
        &format!(
            "Rolled back {} from {} to {}",
            report.environment, report.from, report.to
        ),
        &report,
    );
    Ok(())
}
