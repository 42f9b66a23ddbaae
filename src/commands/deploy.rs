// ABOUTME: Deploy, promote and validate command implementations.
// ABOUTME: Deploys go through the manager; validate only checks policy.

use shipwright::error::Result;
use shipwright::manager::{DeployOptions, DeployReport, DeploymentManager};
use shipwright::output::Output;
use shipwright::validate::DeploymentRequest;

use super::emit_warnings;

/// Deploy a version to one environment.
pub async fn deploy(
    manager: &DeploymentManager,
    request: DeploymentRequest,
    opts: &DeployOptions,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Deploying {} {} to {}",
        manager.config().application,
        request.version,
        request.environment
    ));

    let report = manager.deploy(&request, opts).await?;
    finish(&report, &output, "deployed");
    Ok(())
}

/// Promote a version into the next environment.
pub async fn promote(
    manager: &DeploymentManager,
    version: &str,
    to: &str,
    opts: &DeployOptions,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    output.progress(&format!(
        "Promoting {} {} to {}",
        manager.config().application,
        version,
        to
    ));

    let report = manager.promote(version, to, opts).await?;
    finish(&report, &output, "promoted");
    Ok(())
}

/// Check a request without deploying it.
pub fn validate(
    manager: &DeploymentManager,
    request: DeploymentRequest,
    output: Output,
) -> Result<()> {
    let validated = manager.validate(&request)?;
    output.report(
        "valid",
        &format!(
            "{} {} may deploy to {} as {}",
            manager.config().application,
            validated.version(),
            validated.environment(),
            validated.artifact()
        ),
        &serde_json::json!({
            "environment": validated.environment(),
            "version": validated.version(),
            "artifact": validated.artifact(),
        }),
    );
    Ok(())
}

fn finish(report: &DeployReport, output: &Output, event: &str) {
    emit_warnings(output, &report.warnings);

    let previous = report
        .previous_version
        .as_ref()
        .map(|v| format!(", replacing {v}"))
        .unwrap_or_default();
    output.progress(&format!("  → Artifact: {}", report.artifact));
    output.report(
        event,
        &format!(
            "Deployed {} to {} ({}{previous})",
            report.version,
            report.environment,
            report.deployment_id.short()
        ),
        report,
    );
}
