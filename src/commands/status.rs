// ABOUTME: Read-only commands: status, history and audit verification.
// ABOUTME: Render ledger state as text, or as JSON in --json mode.

use std::fmt::Write;

use shipwright::error::Result;
use shipwright::manager::{DeploymentManager, EnvironmentStatus};
use shipwright::output::Output;
use shipwright::promotion::ReleaseRecord;

pub fn status(manager: &DeploymentManager, output: Output) -> Result<()> {
    let status = manager.status()?;
    output.data("status", &status, || {
        render_status(&manager.config().application.to_string(), &status)
    });
    Ok(())
}

pub fn history(manager: &DeploymentManager, environment: &str, output: Output) -> Result<()> {
    let history = manager.history(environment)?;
    output.data("history", &history, || render_history(environment, &history));
    Ok(())
}

pub fn verify_audit(manager: &DeploymentManager, output: Output) -> Result<()> {
    let count = manager.verify_audit()?;
    output.report(
        "audit_verified",
        &format!("Audit log intact ({count} events)"),
        &serde_json::json!({ "events": count }),
    );
    Ok(())
}

fn render_status(application: &str, status: &[EnvironmentStatus]) -> String {
    let mut out = format!("Application: {application}\n");
    for env in status {
        let current = match &env.current {
            Some(release) => format!("{} ({})", release.version, release.artifact),
            None => "nothing deployed".to_string(),
        };
        let _ = writeln!(out, "  {}: {current}", env.environment);
        for promotion in &env.pending {
            let _ = writeln!(
                out,
                "    pending: {} [{}, {} approval(s)]",
                promotion.version,
                promotion.stage,
                promotion.approvals.len()
            );
        }
    }
    out
}

fn render_history(environment: &str, history: &[ReleaseRecord]) -> String {
    if history.is_empty() {
        return format!("No releases in {environment}");
    }
    let mut out = String::new();
    for release in history.iter().rev() {
        let note = release
            .rolled_back_from
            .as_ref()
            .map(|from| format!(" (rollback from {from})"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{}  {:<12} {:<12} {}  by {}{note}",
            release.started_at.format("%Y-%m-%d %H:%M:%S"),
            release.version.as_str(),
            release.status.to_string(),
            release.deployment_id.short(),
            release.actor
        );
    }
    out
}
