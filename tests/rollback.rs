// ABOUTME: Integration tests for operator-requested rollbacks.
// ABOUTME: Covers target selection, ping-pong rollbacks, and failed reverts.

mod support;

use shipwright::audit::AuditAction;
use shipwright::error::Error;
use shipwright::promotion::ReleaseStatus;
use shipwright::rollback::RollbackError;
use shipwright::validate::DeploymentRequest;
use support::{Harness, opts};
use tempfile::TempDir;

async fn deploy(h: &Harness, version: &str) {
    h.manager
        .deploy(&DeploymentRequest::new("dev", version), &opts("ci"))
        .await
        .unwrap();
}

fn current(h: &Harness) -> String {
    h.manager.status().unwrap()[0]
        .current
        .as_ref()
        .unwrap()
        .version
        .to_string()
}

/// Test: rollback restores the previous release and records where it came from.
#[tokio::test]
async fn rollback_restores_previous_release() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;
    deploy(&h, "1.1.0").await;

    let report = h.manager.rollback("dev", None, &opts("oncall")).await.unwrap();

    assert_eq!(report.from.as_str(), "1.1.0");
    assert_eq!(report.to.as_str(), "1.0.0");
    assert!(report.warnings.is_empty());
    assert_eq!(h.target.calls_to("revert"), vec!["revert dev 1.0.0"]);
    assert_eq!(current(&h), "1.0.0");

    let history = h.manager.history("dev").unwrap();
    let statuses: Vec<_> = history.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ReleaseStatus::Succeeded,
            ReleaseStatus::RolledBack,
            ReleaseStatus::Succeeded
        ]
    );
    let restored = history.last().unwrap();
    assert_eq!(restored.version.as_str(), "1.0.0");
    assert_eq!(restored.rolled_back_from.as_ref().unwrap().as_str(), "1.1.0");
    assert_eq!(restored.actor, "oncall");
    assert!(restored.finished_at.is_some());

    let actions = h.audit.actions();
    assert!(actions.ends_with(&[AuditAction::RollbackStarted, AuditAction::RollbackSucceeded]));
    assert_eq!(h.manager.verify_audit().unwrap(), actions.len());
}

/// Test: a second rollback does not bring back the release just rolled back.
#[tokio::test]
async fn rollback_twice_does_not_roll_forward() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;
    deploy(&h, "1.1.0").await;

    h.manager.rollback("dev", None, &opts("ci")).await.unwrap();
    let err = h.manager.rollback("dev", None, &opts("ci")).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Rollback(RollbackError::NoPreviousRelease { .. })
    ));
    assert_eq!(current(&h), "1.0.0");
    assert_eq!(h.target.calls_to("revert"), vec!["revert dev 1.0.0"]);
}

/// Test: a rolled-back release cannot be named as a rollback target.
#[tokio::test]
async fn rolled_back_version_is_not_a_target() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;
    deploy(&h, "1.1.0").await;
    h.manager.rollback("dev", None, &opts("ci")).await.unwrap();

    let err = h
        .manager
        .rollback("dev", Some("1.1.0"), &opts("ci"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Rollback(RollbackError::VersionNotFound(ref v)) if v == "1.1.0"
    ));
    assert_eq!(current(&h), "1.0.0");
}

/// Test: an explicit version skips over newer releases.
#[tokio::test]
async fn rollback_to_explicit_version() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    for version in ["1.0.0", "1.1.0", "1.2.0"] {
        deploy(&h, version).await;
    }

    let report = h
        .manager
        .rollback("dev", Some("1.0.0"), &opts("ci"))
        .await
        .unwrap();

    assert_eq!(report.from.as_str(), "1.2.0");
    assert_eq!(report.to.as_str(), "1.0.0");
    assert_eq!(current(&h), "1.0.0");
}

/// Test: an environment that never deployed has nothing to roll back.
#[tokio::test]
async fn rollback_without_releases() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());

    let err = h
        .manager
        .rollback("dev", None, &opts("ci"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Rollback(RollbackError::NoCurrentRelease)
    ));
    assert!(h.target.calls().is_empty());
    assert!(h.audit.actions().is_empty());
}

/// Test: a single release has no predecessor.
#[tokio::test]
async fn rollback_with_single_release() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;

    let err = h
        .manager
        .rollback("dev", None, &opts("ci"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Rollback(RollbackError::NoPreviousRelease { ref current }) if current == "1.0.0"
    ));
}

/// Test: rolling back to what already runs is refused.
#[tokio::test]
async fn rollback_to_current_version() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;
    deploy(&h, "1.1.0").await;

    let err = h
        .manager
        .rollback("dev", Some("1.1.0"), &opts("ci"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Rollback(RollbackError::AlreadyCurrent(_))
    ));

    let err = h
        .manager
        .rollback("dev", Some("0.9.0"), &opts("ci"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Rollback(RollbackError::VersionNotFound(_))
    ));
}

/// Test: a failed revert leaves the ledger untouched and is audited.
#[tokio::test]
async fn failed_revert_keeps_current_release() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;
    deploy(&h, "1.1.0").await;
    h.target.fail_revert();

    let err = h
        .manager
        .rollback("dev", None, &opts("ci"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Rollback(RollbackError::Revert(_))));
    assert_eq!(current(&h), "1.1.0");
    assert_eq!(h.manager.history("dev").unwrap().len(), 2);
    assert_eq!(h.audit.actions().last(), Some(&AuditAction::RollbackFailed));
}

/// Test: a restored release that never turns healthy fails the rollback.
#[tokio::test]
async fn unhealthy_restore_fails_rollback() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());
    deploy(&h, "1.0.0").await;
    deploy(&h, "1.1.0").await;
    h.target.unhealthy("1.0.0");

    let err = h
        .manager
        .rollback("dev", None, &opts("ci"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Rollback(RollbackError::Unhealthy(_))));
    assert_eq!(current(&h), "1.1.0");
}

/// Test: rollback of an unknown environment fails before any lock is taken.
#[tokio::test]
async fn rollback_unknown_environment() {
    let dir = TempDir::new().unwrap();
    let h = Harness::pipeline(dir.path());

    let err = h
        .manager
        .rollback("qa", None, &opts("ci"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnknownEnvironment(ref env) if env == "qa"));
    assert!(!h.manager.state_dir().join("locks").exists());
}
