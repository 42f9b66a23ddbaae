// ABOUTME: Test support utilities.
// ABOUTME: Provides a scripted in-memory deploy target and manager setup helpers.

use async_trait::async_trait;
use parking_lot::Mutex;
use shipwright::audit::MemoryAuditLog;
use shipwright::config::{Config, EnvironmentConfig};
use shipwright::deploy::{DeployContext, DeployTarget, RejectedSnafu, TargetError, TargetProvider};
use shipwright::manager::{DeployOptions, DeploymentManager};
use shipwright::notify::NotificationHub;
use shipwright::promotion::ReleaseRecord;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Once};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("shipwright=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A deploy target whose outcomes are scripted per version.
///
/// Every call is recorded as `"<operation> <environment> <version>"`; for
/// `revert` the version is the one being restored.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedTarget {
    calls: Mutex<Vec<String>>,
    failing_precheck: Mutex<HashSet<String>>,
    failing_apply: Mutex<HashSet<String>>,
    unhealthy: Mutex<HashSet<String>>,
    failing_revert: Mutex<bool>,
}

#[allow(dead_code)]
impl ScriptedTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_precheck(&self, version: &str) {
        self.failing_precheck.lock().insert(version.to_string());
    }

    pub fn fail_apply(&self, version: &str) {
        self.failing_apply.lock().insert(version.to_string());
    }

    pub fn allow_apply(&self, version: &str) {
        self.failing_apply.lock().remove(version);
    }

    pub fn unhealthy(&self, version: &str) {
        self.unhealthy.lock().insert(version.to_string());
    }

    pub fn healthy(&self, version: &str) {
        self.unhealthy.lock().remove(version);
    }

    pub fn fail_revert(&self) {
        *self.failing_revert.lock() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls whose operation is `op`.
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .collect()
    }

    fn record(&self, op: &str, ctx: &DeployContext, version: &str) {
        self.calls
            .lock()
            .push(format!("{op} {} {version}", ctx.environment));
    }
}

#[async_trait]
impl DeployTarget for ScriptedTarget {
    async fn precheck(&self, ctx: &DeployContext) -> Result<(), TargetError> {
        self.record("precheck", ctx, ctx.version.as_str());
        if self.failing_precheck.lock().contains(ctx.version.as_str()) {
            return RejectedSnafu {
                message: "precheck refused",
            }
            .fail();
        }
        Ok(())
    }

    async fn apply(&self, ctx: &DeployContext) -> Result<(), TargetError> {
        self.record("apply", ctx, ctx.version.as_str());
        // Let concurrent deployments interleave here, as real ones would.
        tokio::task::yield_now().await;
        if self.failing_apply.lock().contains(ctx.version.as_str()) {
            return RejectedSnafu {
                message: "apply exploded",
            }
            .fail();
        }
        Ok(())
    }

    async fn health_check(&self, ctx: &DeployContext) -> Result<bool, TargetError> {
        self.record("health", ctx, ctx.version.as_str());
        Ok(!self.unhealthy.lock().contains(ctx.version.as_str()))
    }

    async fn revert(&self, ctx: &DeployContext, to: &ReleaseRecord) -> Result<(), TargetError> {
        self.record("revert", ctx, to.version.as_str());
        if *self.failing_revert.lock() {
            return RejectedSnafu {
                message: "revert exploded",
            }
            .fail();
        }
        Ok(())
    }
}

/// Hands out the same scripted target for every environment.
pub struct StaticTargets(pub Arc<ScriptedTarget>);

impl TargetProvider for StaticTargets {
    fn target(&self, _env: &EnvironmentConfig) -> Arc<dyn DeployTarget> {
        self.0.clone()
    }
}

/// dev → staging → production, production gated on one approval from alice or bob.
#[allow(dead_code)]
pub const PIPELINE_YAML: &str = r#"
application: shop
artifact: registry.example.com/shop:{version}
health_timeout: 5s
environments:
  - name: dev
    apply: "true"
    healthcheck: { cmd: "true", interval: 10ms, timeout: 1s, retries: 1 }
  - name: staging
    apply: "true"
    healthcheck: { cmd: "true", interval: 10ms, timeout: 1s, retries: 1 }
  - name: production
    apply: "true"
    healthcheck: { cmd: "true", interval: 10ms, timeout: 1s, retries: 1 }
    allow_prerelease: false
    allow_floating: false
    approval:
      required: 1
      approvers: [alice, bob]
"#;

/// A manager over `yaml` with a scripted target, in-memory audit log and no notifiers.
#[allow(dead_code)]
pub struct Harness {
    pub manager: DeploymentManager,
    pub target: Arc<ScriptedTarget>,
    pub audit: Arc<MemoryAuditLog>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(project_dir: &Path, yaml: &str) -> Self {
        init_tracing();
        let config = Config::from_yaml(yaml).unwrap();
        let target = ScriptedTarget::new();
        let audit = Arc::new(MemoryAuditLog::new());
        let manager = DeploymentManager::new(config, project_dir)
            .unwrap()
            .with_targets(Arc::new(StaticTargets(target.clone())))
            .with_audit(audit.clone())
            .with_notifier(NotificationHub::new());
        Self {
            manager,
            target,
            audit,
        }
    }

    pub fn pipeline(project_dir: &Path) -> Self {
        Self::new(project_dir, PIPELINE_YAML)
    }
}

#[allow(dead_code)]
pub fn opts(actor: &str) -> DeployOptions {
    DeployOptions::new(actor)
}
