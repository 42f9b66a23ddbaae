// ABOUTME: Integration tests for hooks system.
// ABOUTME: Tests hook discovery, execution, and environment variable passing.

use shipwright::deploy::DeployContext;
use shipwright::hooks::{HookContext, HookPoint, HookRunner};
use shipwright::types::{AppName, ArtifactRef, DeploymentId, EnvironmentName, Version};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

fn create_hook(dir: &TempDir, name: &str, script: &str) {
    let hooks_dir = dir.path().join(".shipwright").join("hooks");
    fs::create_dir_all(&hooks_dir).unwrap();

    let hook_path = hooks_dir.join(name);
    fs::write(&hook_path, script).unwrap();

    let mut perms = fs::metadata(&hook_path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&hook_path, perms).unwrap();
}

fn deploy_context() -> DeployContext {
    DeployContext {
        application: AppName::new("testapp").unwrap(),
        environment: EnvironmentName::new("staging").unwrap(),
        version: Version::parse("1.0.0").unwrap(),
        artifact: ArtifactRef::parse("registry.example.com/testapp:1.0.0").unwrap(),
        deployment_id: DeploymentId::generate(),
        actor: "ci".to_string(),
        previous_version: Some(Version::parse("0.9.0").unwrap()),
        env: HashMap::new(),
    }
}

fn test_context() -> HookContext {
    HookContext::new(&deploy_context())
}

/// Test: pre-deploy hook runs before deployment.
#[tokio::test]
async fn pre_deploy_hook_runs() {
    let temp_dir = TempDir::new().unwrap();
    create_hook(
        &temp_dir,
        "pre-deploy",
        "#!/bin/sh\necho 'pre-deploy ran'\nexit 0\n",
    );

    let runner = HookRunner::new(temp_dir.path());
    assert!(runner.hook_exists(HookPoint::PreDeploy));

    let result = runner
        .run(HookPoint::PreDeploy, &test_context())
        .await
        .expect("hook should run");
    assert!(result.success);
    assert!(result.stdout.contains("pre-deploy ran"));
}

/// Test: post-deploy hook runs after successful deployment.
#[tokio::test]
async fn post_deploy_hook_runs() {
    let temp_dir = TempDir::new().unwrap();
    create_hook(
        &temp_dir,
        "post-deploy",
        "#!/bin/sh\necho 'post-deploy ran'\nexit 0\n",
    );

    let runner = HookRunner::new(temp_dir.path());
    let result = runner
        .run(HookPoint::PostDeploy, &test_context())
        .await
        .expect("hook should run");
    assert!(result.success);
    assert!(result.stdout.contains("post-deploy ran"));
}

/// Test: on-error hook sees the failure reason.
#[tokio::test]
async fn on_error_hook_receives_error() {
    let temp_dir = TempDir::new().unwrap();
    create_hook(
        &temp_dir,
        "on-error",
        "#!/bin/sh\necho \"ERROR=$SHIPWRIGHT_ERROR\"\n",
    );

    let runner = HookRunner::new(temp_dir.path());
    let context = test_context().with_error("health check failed: unhealthy");
    let result = runner
        .run(HookPoint::OnError, &context)
        .await
        .expect("hook should run");

    assert!(result.success);
    assert!(
        result
            .stdout
            .contains("ERROR=health check failed: unhealthy")
    );
}

/// Test: post-rollback hook runs from the project directory.
#[tokio::test]
async fn post_rollback_hook_runs_in_project_dir() {
    let temp_dir = TempDir::new().unwrap();
    create_hook(
        &temp_dir,
        "post-rollback",
        "#!/bin/sh\necho \"$SHIPWRIGHT_VERSION\" > rolled-back.txt\n",
    );

    let runner = HookRunner::new(temp_dir.path());
    let result = runner
        .run(HookPoint::PostRollback, &test_context())
        .await
        .expect("hook should run");

    assert!(result.success);
    let written = fs::read_to_string(temp_dir.path().join("rolled-back.txt")).unwrap();
    assert_eq!(written.trim(), "1.0.0");
}

/// Test: Hook failure in pre-deploy is detectable.
#[tokio::test]
async fn pre_deploy_failure_detected() {
    let temp_dir = TempDir::new().unwrap();
    create_hook(
        &temp_dir,
        "pre-deploy",
        "#!/bin/sh\necho 'change freeze' >&2\nexit 1\n",
    );

    let runner = HookRunner::new(temp_dir.path());
    let result = runner
        .run(HookPoint::PreDeploy, &test_context())
        .await
        .expect("hook should run");

    assert!(!result.success);
    assert_eq!(result.exit_code, Some(1));
    assert!(HookPoint::PreDeploy.is_fatal());
    assert_eq!(
        result.describe_failure(HookPoint::PreDeploy),
        "pre-deploy hook exited with code 1: change freeze"
    );
}

/// Test: Hook receives correct environment variables.
#[tokio::test]
async fn hook_receives_environment_variables() {
    let temp_dir = TempDir::new().unwrap();
    create_hook(
        &temp_dir,
        "pre-deploy",
        r#"#!/bin/sh
echo "APPLICATION=$SHIPWRIGHT_APPLICATION"
echo "ENVIRONMENT=$SHIPWRIGHT_ENVIRONMENT"
echo "VERSION=$SHIPWRIGHT_VERSION"
echo "ARTIFACT=$SHIPWRIGHT_ARTIFACT"
echo "ACTOR=$SHIPWRIGHT_ACTOR"
echo "PREVIOUS=$SHIPWRIGHT_PREVIOUS_VERSION"
echo "ERROR=${SHIPWRIGHT_ERROR-unset}"
exit 0
"#,
    );

    let runner = HookRunner::new(temp_dir.path());
    let result = runner
        .run(HookPoint::PreDeploy, &test_context())
        .await
        .expect("hook should run");

    assert!(result.success);
    assert!(result.stdout.contains("APPLICATION=testapp"));
    assert!(result.stdout.contains("ENVIRONMENT=staging"));
    assert!(result.stdout.contains("VERSION=1.0.0"));
    assert!(
        result
            .stdout
            .contains("ARTIFACT=registry.example.com/testapp:1.0.0")
    );
    assert!(result.stdout.contains("ACTOR=ci"));
    assert!(result.stdout.contains("PREVIOUS=0.9.0"));
    assert!(result.stdout.contains("ERROR=unset"));
}

/// Test: A hook file that cannot be executed reports a failure.
#[tokio::test]
async fn non_executable_hook_fails() {
    let temp_dir = TempDir::new().unwrap();
    let hooks_dir = temp_dir.path().join(".shipwright").join("hooks");
    fs::create_dir_all(&hooks_dir).unwrap();
    fs::write(hooks_dir.join("post-deploy"), "#!/bin/sh\nexit 0\n").unwrap();

    let runner = HookRunner::new(temp_dir.path());
    let result = runner
        .run(HookPoint::PostDeploy, &test_context())
        .await
        .expect("hook exists, so it is attempted");

    assert!(!result.success);
    assert_eq!(result.exit_code, None);
    assert!(
        result
            .describe_failure(HookPoint::PostDeploy)
            .starts_with("post-deploy hook failed")
    );
}

/// Test: Missing hook returns None.
#[tokio::test]
async fn missing_hook_returns_none() {
    let temp_dir = TempDir::new().unwrap();

    let runner = HookRunner::new(temp_dir.path());
    assert!(!runner.hook_exists(HookPoint::PreDeploy));

    let result = runner.run(HookPoint::PreDeploy, &test_context()).await;
    assert!(result.is_none());
}
