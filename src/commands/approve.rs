// ABOUTME: Approve command implementation.
// ABOUTME: Records one approver's sign-off and reports progress toward the gate.

use shipwright::error::Result;
use shipwright::manager::DeploymentManager;
use shipwright::output::Output;

use super::emit_warnings;

pub async fn approve(
    manager: &DeploymentManager,
    environment: &str,
    version: &str,
    approver: &str,
    output: Output,
) -> Result<()> {
    let report = manager.approve(environment, version, approver).await?;
    emit_warnings(&output, &report.warnings);

    let message = if report.status.approved {
        format!(
            "{} approved for {} ({}/{})",
            report.version, report.environment, report.status.have, report.status.need
        )
    } else {
        format!(
            "Approval recorded for {} in {} ({}/{}, waiting for more)",
            report.version, report.environment, report.status.have, report.status.need
        )
    };
    output.report("approved", &message, &report);
    Ok(())
}
