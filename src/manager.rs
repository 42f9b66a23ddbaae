// ABOUTME: DeploymentManager ties validation, promotion, execution, rollback and audit together.
// ABOUTME: Every operation the CLI offers is a method here; targets, audit and notifiers are injectable.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audit::{AuditAction, AuditEntry, AuditSink, FileAuditLog};
use crate::config::{Config, EnvironmentConfig, resolve_env_map};
use crate::deploy::{
    DeployContext, DeployError, DeployLock, Deployment, Finalized, Initialized, ShellTargets,
    TargetProvider,
};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::hooks::{HookContext, HookPoint, HookRunner};
use crate::notify::{Notification, NotificationHub, NotificationKind};
use crate::promotion::{
    ApprovalStatus, Ledger, LedgerStore, Promotion, PromotionError, ReleaseRecord, ReleaseStatus,
    Stage,
};
use crate::rollback::{RollbackCoordinator, RollbackError, select_target};
use crate::types::{ArtifactRef, DeploymentId, EnvironmentName, Version};
use crate::validate::{DeploymentRequest, ValidatedRequest, ValidationError, Violation, validate};

/// Per-call options shared by the mutating operations.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Who is acting; recorded in the ledger and audit log.
    pub actor: String,
    /// Break an existing deploy lock regardless of its age.
    pub force_lock: bool,
}

impl DeployOptions {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            force_lock: false,
        }
    }

    pub fn force_lock(mut self, force: bool) -> Self {
        self.force_lock = force;
        self
    }
}

/// A successful deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub deployment_id: DeploymentId,
    pub environment: EnvironmentName,
    pub version: Version,
    pub artifact: ArtifactRef,
    pub previous_version: Option<Version>,
    pub duration_secs: f64,
    pub warnings: Vec<Warning>,
}

/// A successful rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub environment: EnvironmentName,
    pub from: Version,
    pub to: Version,
    pub warnings: Vec<Warning>,
}

/// The result of recording an approval.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalReport {
    pub environment: EnvironmentName,
    pub version: Version,
    #[serde(flatten)]
    pub status: ApprovalStatus,
    pub warnings: Vec<Warning>,
}

/// What is running in one environment and what is waiting to go there.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentStatus {
    pub environment: EnvironmentName,
    pub current: Option<ReleaseRecord>,
    pub pending: Vec<Promotion>,
}

/// How the executor's run ended when it did not finalize.
struct ExecutionFailure {
    error: DeployError,
    /// `None` when no rollback was attempted.
    rollback: Option<std::result::Result<Version, DeployError>>,
}

pub struct DeploymentManager {
    config: Config,
    state_dir: PathBuf,
    store: LedgerStore,
    targets: Arc<dyn TargetProvider>,
    audit: Arc<dyn AuditSink>,
    notifier: NotificationHub,
    hooks: HookRunner,
}

impl DeploymentManager {
    /// Manager for the project in `project_dir`: shell targets, the file audit
    /// log in the state directory, and the configured notifiers.
    pub fn new(config: Config, project_dir: &Path) -> Result<Self> {
        let state_dir = config.state_dir(project_dir);
        let notifier = NotificationHub::from_config(&config.notifications);
        Ok(Self {
            store: LedgerStore::new(&state_dir, &config.application),
            targets: Arc::new(ShellTargets::new(project_dir)),
            audit: Arc::new(FileAuditLog::in_state_dir(&state_dir)),
            hooks: HookRunner::new(project_dir),
            notifier,
            state_dir,
            config,
        })
    }

    pub fn with_targets(mut self, targets: Arc<dyn TargetProvider>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_notifier(mut self, notifier: NotificationHub) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn locks_dir(&self) -> PathBuf {
        self.state_dir.join("locks")
    }

    /// Check a request against policy without deploying it.
    pub fn validate(&self, request: &DeploymentRequest) -> Result<ValidatedRequest> {
        Ok(validate(request, &self.config)?)
    }

    // =========================================================================
    // deploy
    // =========================================================================

    /// Validate, then run the full deployment of `request` under the environment's lock.
    ///
    /// # Errors
    ///
    /// Policy refusals (validation, ordering, approval, lock) fail before the
    /// target is touched. A failed execution returns `Error::DeploymentFailed`
    /// after the automatic rollback, if one was possible.
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        opts: &DeployOptions,
    ) -> Result<DeployReport> {
        let validated = validate(request, &self.config)?;
        let env = self.config.environment(validated.environment().as_str())?;
        let mut diag = Diagnostics::default();

        let lock = self.acquire_lock(env, opts, &mut diag)?;
        let result = lock
            .hold_while(self.deploy_locked(&validated, env, opts, &mut diag))
            .await;

        result.map(|mut report| {
            report.warnings = diag.into_warnings();
            report
        })
    }

    async fn deploy_locked(
        &self,
        request: &ValidatedRequest,
        env: &EnvironmentConfig,
        opts: &DeployOptions,
        diag: &mut Diagnostics,
    ) -> Result<DeployReport> {
        let version = request.version();
        let command_env = resolve_env_map(&env.env)?;
        let record = ReleaseRecord::start(version.clone(), request.artifact().clone(), &opts.actor);
        let deployment_id = record.deployment_id.clone();

        // An approval gate refuses `begin`, but the opened promotion is kept.
        let (opened, begun) = self.store.update(|ledger| -> Result<_> {
            let opened = open_promotion(ledger, env, version, &self.config)?;
            let begun = ledger
                .begin(&env.name, version, env.approval.as_ref())
                .map(|()| {
                    let previous = ledger.current_release(&env.name).cloned();
                    ledger.record_release(&env.name, record);
                    previous
                });
            Ok((opened, begun))
        })?;
        self.announce_promotion(opened, env, version, &opts.actor, diag)
            .await;
        let previous = begun?;

        let context = DeployContext {
            application: self.config.application.clone(),
            environment: env.name.clone(),
            version: version.clone(),
            artifact: request.artifact().clone(),
            deployment_id,
            actor: opts.actor.clone(),
            previous_version: previous.as_ref().map(|r| r.version.clone()),
            env: command_env,
        };

        self.record(
            AuditEntry::new(&self.config.application, AuditAction::DeployStarted, &opts.actor)
                .environment(&env.name)
                .version(version)
                .detail(format!(
                    "deployment {} of {}",
                    context.deployment_id, context.artifact
                )),
            diag,
        );

        if let Some(result) = self
            .hooks
            .run(HookPoint::PreDeploy, &HookContext::new(&context))
            .await
            && !result.success
        {
            let reason = result.describe_failure(HookPoint::PreDeploy);
            self.conclude_failure(&context, &reason, None, diag).await?;
            return Err(Error::Hook(reason));
        }

        let target = self.targets.target(env);
        let deployment = Deployment::new(
            context.clone(),
            target,
            env.healthcheck.clone(),
            self.config.health_timeout_for(env),
        );
        let restore_to = previous.as_ref().filter(|_| env.auto_rollback);

        match execute(deployment, restore_to).await {
            Ok(finished) => {
                self.conclude_success(&context, diag).await?;
                Ok(DeployReport {
                    deployment_id: context.deployment_id.clone(),
                    environment: env.name.clone(),
                    version: version.clone(),
                    artifact: context.artifact.clone(),
                    previous_version: context.previous_version.clone(),
                    duration_secs: finished.elapsed().num_milliseconds() as f64 / 1000.0,
                    warnings: Vec::new(),
                })
            }
            Err(failure) => {
                let restored = self.record_auto_rollback(&context, &failure, diag).await;
                let reason = failure.error.to_string();
                self.conclude_failure(&context, &reason, restored.as_ref(), diag)
                    .await?;
                Err(Error::DeploymentFailed {
                    environment: env.name.to_string(),
                    version: version.to_string(),
                    reason,
                    rolled_back: restored.is_some(),
                })
            }
        }
    }

    /// Audit a newly opened promotion and announce its approval gate.
    async fn announce_promotion(
        &self,
        opened: Option<Stage>,
        env: &EnvironmentConfig,
        version: &Version,
        actor: &str,
        diag: &mut Diagnostics,
    ) {
        let Some(stage) = opened else {
            return;
        };

        self.record(
            AuditEntry::new(&self.config.application, AuditAction::PromotionOpened, actor)
                .environment(&env.name)
                .version(version)
                .detail(format!("stage {stage}")),
            diag,
        );
        if stage == Stage::AwaitingApproval {
            let need = env.approval.as_ref().map_or(1, |p| p.required);
            self.notify(
                NotificationKind::ApprovalRequired,
                &env.name,
                version,
                format!("needs {need} approval(s)"),
                diag,
            )
            .await;
        }
    }

    async fn conclude_success(
        &self,
        context: &DeployContext,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        self.store.update(|ledger| -> Result<()> {
            ledger.complete_release(
                &context.environment,
                &context.deployment_id,
                ReleaseStatus::Succeeded,
            );
            ledger.finish(&context.environment, &context.version, true)?;
            Ok(())
        })?;

        tracing::info!(
            environment = %context.environment,
            version = %context.version,
            "Deployment succeeded"
        );
        self.record(
            AuditEntry::new(
                &self.config.application,
                AuditAction::DeploySucceeded,
                &context.actor,
            )
            .environment(&context.environment)
            .version(&context.version)
            .detail(format!("deployment {}", context.deployment_id)),
            diag,
        );

        self.run_hook(HookPoint::PostDeploy, HookContext::new(context), diag)
            .await;
        self.notify(
            NotificationKind::Succeeded,
            &context.environment,
            &context.version,
            "",
            diag,
        )
        .await;
        Ok(())
    }

    /// Record the failed release. `restored` is the version an automatic
    /// rollback put back, which is deployed again even when it is the version
    /// that just failed.
    async fn conclude_failure(
        &self,
        context: &DeployContext,
        reason: &str,
        restored: Option<&Version>,
        diag: &mut Diagnostics,
    ) -> Result<()> {
        self.store.update(|ledger| -> Result<()> {
            ledger.complete_release(
                &context.environment,
                &context.deployment_id,
                ReleaseStatus::Failed,
            );
            ledger.finish(&context.environment, &context.version, false)?;
            if let Some(restored) = restored
                && let Err(e) = ledger.restore(&context.environment, restored)
            {
                diag.warn(Warning::ledger(format!(
                    "could not mark {restored} deployed: {e}"
                )));
            }
            Ok(())
        })?;
        let rolled_back = restored.is_some();

        tracing::error!(
            environment = %context.environment,
            version = %context.version,
            rolled_back,
            "Deployment failed: {reason}"
        );
        self.record(
            AuditEntry::new(
                &self.config.application,
                AuditAction::DeployFailed,
                &context.actor,
            )
            .environment(&context.environment)
            .version(&context.version)
            .detail(reason),
            diag,
        );

        self.run_hook(
            HookPoint::OnError,
            HookContext::new(context).with_error(reason),
            diag,
        )
        .await;
        let message = if rolled_back {
            format!("{reason} (rolled back)")
        } else {
            reason.to_string()
        };
        self.notify(
            NotificationKind::Failed,
            &context.environment,
            &context.version,
            message,
            diag,
        )
        .await;
        Ok(())
    }

    /// Audit and announce the automatic rollback, if one ran. Returns the version it restored.
    async fn record_auto_rollback(
        &self,
        context: &DeployContext,
        failure: &ExecutionFailure,
        diag: &mut Diagnostics,
    ) -> Option<Version> {
        let rollback = failure.rollback.as_ref()?;

        let entry = |action| {
            AuditEntry::new(&self.config.application, action, &context.actor)
                .environment(&context.environment)
                .version(&context.version)
        };

        match rollback {
            Ok(restored) => {
                self.record(
                    entry(AuditAction::RollbackSucceeded)
                        .detail(format!("automatic: {} -> {restored}", context.version)),
                    diag,
                );
                self.notify(
                    NotificationKind::RolledBack,
                    &context.environment,
                    restored,
                    format!("automatic rollback from {}", context.version),
                    diag,
                )
                .await;
                Some(restored.clone())
            }
            Err(e) => {
                self.record(
                    entry(AuditAction::RollbackFailed).detail(format!("automatic: {e}")),
                    diag,
                );
                None
            }
        }
    }

    // =========================================================================
    // promote
    // =========================================================================

    /// Deploy `version` to `to_env` using the exact artifact that ran in the previous environment.
    pub async fn promote(
        &self,
        version: &str,
        to_env: &str,
        opts: &DeployOptions,
    ) -> Result<DeployReport> {
        let env = self.config.environment(to_env)?;
        let source = self
            .config
            .previous_environment(&env.name)
            .ok_or_else(|| Error::NothingToPromoteFrom(env.name.to_string()))?;
        let parsed = parse_version(version)?;

        let ledger = self.store.load()?;
        let artifact = ledger
            .artifact_for(&source.name, &parsed)
            .ok_or_else(|| PromotionError::NotPromoted {
                version: parsed.to_string(),
                environment: env.name.to_string(),
                required: source.name.to_string(),
            })?;

        tracing::info!(
            from = %source.name,
            to = %env.name,
            %artifact,
            "Promoting {parsed}"
        );
        let request = DeploymentRequest::new(env.name.as_str(), version)
            .with_artifact(artifact.to_string());
        self.deploy(&request, opts).await
    }

    // =========================================================================
    // approve
    // =========================================================================

    /// Record `approver`'s sign-off for `version` in `env`.
    pub async fn approve(
        &self,
        env: &str,
        version: &str,
        approver: &str,
    ) -> Result<ApprovalReport> {
        let env = self.config.environment(env)?;
        let version = parse_version(version)?;
        let mut diag = Diagnostics::default();

        let (opened, approved) = self.store.update(|ledger| -> Result<_> {
            let opened = open_promotion(ledger, env, &version, &self.config)?;
            let approved = ledger.approve(&env.name, &version, approver, env.approval.as_ref());
            Ok((opened, approved))
        })?;
        self.announce_promotion(opened, env, &version, approver, &mut diag)
            .await;
        let status = approved?;

        self.record(
            AuditEntry::new(
                &self.config.application,
                AuditAction::ApprovalGranted,
                approver,
            )
            .environment(&env.name)
            .version(&version)
            .detail(format!("{}/{}", status.have, status.need)),
            &mut diag,
        );

        if !status.approved {
            self.notify(
                NotificationKind::ApprovalRequired,
                &env.name,
                &version,
                format!("{} of {} approvals", status.have, status.need),
                &mut diag,
            )
            .await;
        }

        Ok(ApprovalReport {
            environment: env.name.clone(),
            version,
            status,
            warnings: diag.into_warnings(),
        })
    }

    // =========================================================================
    // rollback
    // =========================================================================

    /// Restore `to` (or the most recent earlier release) in `env`.
    pub async fn rollback(
        &self,
        env: &str,
        to: Option<&str>,
        opts: &DeployOptions,
    ) -> Result<RollbackReport> {
        let env = self.config.environment(env)?;
        let requested = to.map(parse_version).transpose()?;
        let mut diag = Diagnostics::default();

        let lock = self.acquire_lock(env, opts, &mut diag)?;
        let result = lock
            .hold_while(self.rollback_locked(env, requested.as_ref(), opts, &mut diag))
            .await;

        result.map(|mut report| {
            report.warnings = diag.into_warnings();
            report
        })
    }

    async fn rollback_locked(
        &self,
        env: &EnvironmentConfig,
        requested: Option<&Version>,
        opts: &DeployOptions,
        diag: &mut Diagnostics,
    ) -> Result<RollbackReport> {
        let command_env = resolve_env_map(&env.env)?;
        // The environment's deploy lock keeps these from changing until the update below.
        let (target_release, current) = {
            let ledger = self.store.load()?;
            let target_release = select_target(ledger.history(&env.name), requested)?.clone();
            let current = ledger
                .current_release(&env.name)
                .cloned()
                .ok_or(RollbackError::NoCurrentRelease)?;
            (target_release, current)
        };

        let restored = ReleaseRecord {
            rolled_back_from: Some(current.version.clone()),
            ..ReleaseRecord::start(
                target_release.version.clone(),
                target_release.artifact.clone(),
                &opts.actor,
            )
        };
        let context = DeployContext {
            application: self.config.application.clone(),
            environment: env.name.clone(),
            version: current.version.clone(),
            artifact: current.artifact.clone(),
            deployment_id: restored.deployment_id.clone(),
            actor: opts.actor.clone(),
            previous_version: None,
            env: command_env,
        };

        let entry = |action| {
            AuditEntry::new(&self.config.application, action, &opts.actor)
                .environment(&env.name)
                .version(&target_release.version)
        };
        self.record(
            entry(AuditAction::RollbackStarted)
                .detail(format!("{} -> {}", current.version, target_release.version)),
            diag,
        );

        let coordinator = RollbackCoordinator::new(
            self.targets.target(env),
            env.healthcheck.clone(),
            self.config.health_timeout_for(env),
        );

        let outcome = match coordinator.execute(&context, &target_release).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                self.record(entry(AuditAction::RollbackFailed).detail(&reason), diag);
                self.run_hook(
                    HookPoint::OnError,
                    HookContext::new(&context.reverting_to(&target_release)).with_error(&reason),
                    diag,
                )
                .await;
                self.notify(
                    NotificationKind::Failed,
                    &env.name,
                    &target_release.version,
                    format!("rollback from {} failed: {reason}", current.version),
                    diag,
                )
                .await;
                return Err(e.into());
            }
        };

        let mut restored = restored;
        restored.status = ReleaseStatus::Succeeded;
        restored.finished_at = Some(outcome.finished_at);
        self.store.update(|ledger| -> Result<()> {
            ledger.complete_release(&env.name, &current.deployment_id, ReleaseStatus::RolledBack);
            ledger.record_release(&env.name, restored);

            if let Err(e) = ledger.mark_rolled_back(&env.name, &outcome.from) {
                diag.warn(Warning::ledger(format!(
                    "could not mark {} rolled back: {e}",
                    outcome.from
                )));
            }
            if let Err(e) = ledger.restore(&env.name, &outcome.to) {
                diag.warn(Warning::ledger(format!(
                    "could not mark {} deployed: {e}",
                    outcome.to
                )));
            }
            Ok(())
        })?;

        self.record(
            entry(AuditAction::RollbackSucceeded)
                .detail(format!("{} -> {}", outcome.from, outcome.to)),
            diag,
        );
        self.run_hook(
            HookPoint::PostRollback,
            HookContext::new(&context.reverting_to(&target_release)),
            diag,
        )
        .await;
        self.notify(
            NotificationKind::RolledBack,
            &env.name,
            &outcome.to,
            format!("rolled back from {}", outcome.from),
            diag,
        )
        .await;

        Ok(RollbackReport {
            environment: env.name.clone(),
            from: outcome.from,
            to: outcome.to,
            warnings: Vec::new(),
        })
    }

    // =========================================================================
    // queries
    // =========================================================================

    /// Current release and pending promotions for every environment, in chain order.
    pub fn status(&self) -> Result<Vec<EnvironmentStatus>> {
        let ledger = self.store.load()?;
        Ok(self
            .config
            .environments
            .iter()
            .map(|env| EnvironmentStatus {
                environment: env.name.clone(),
                current: ledger.current_release(&env.name).cloned(),
                pending: ledger.pending_promotions(&env.name).cloned().collect(),
            })
            .collect())
    }

    /// Releases for `env`, oldest first.
    pub fn history(&self, env: &str) -> Result<Vec<ReleaseRecord>> {
        let env = self.config.environment(env)?;
        let ledger = self.store.load()?;
        Ok(ledger.history(&env.name).to_vec())
    }

    /// Verify the audit chain, returning the number of events checked.
    pub fn verify_audit(&self) -> Result<usize> {
        Ok(self.audit.verify()?)
    }

    // =========================================================================
    // helpers
    // =========================================================================

    fn acquire_lock(
        &self,
        env: &EnvironmentConfig,
        opts: &DeployOptions,
        diag: &mut Diagnostics,
    ) -> Result<DeployLock> {
        let lock = DeployLock::acquire(
            &self.locks_dir(),
            &self.config.application,
            &env.name,
            self.config.lock.stale_after,
            opts.force_lock,
        )?;

        if let Some(broken) = lock.broken() {
            let holder = broken
                .previous
                .as_ref()
                .map_or_else(|| "unknown".to_string(), |info| info.holder.clone());
            diag.warn(Warning::lock_broken(format!(
                "broke {} deploy lock for {} held by {holder}",
                broken.reason, env.name
            )));
            self.record(
                AuditEntry::new(
                    &self.config.application,
                    AuditAction::LockBroken,
                    &opts.actor,
                )
                .environment(&env.name)
                .detail(format!("{} lock held by {holder}", broken.reason)),
                diag,
            );
        }
        Ok(lock)
    }

    /// Append to the audit log. A write failure is a warning, not an abort.
    fn record(&self, entry: AuditEntry, diag: &mut Diagnostics) {
        let action = entry.action;
        if let Err(e) = self.audit.append(entry) {
            diag.warn(Warning::audit(format!("failed to record {action}: {e}")));
        }
    }

    async fn run_hook(&self, point: HookPoint, context: HookContext, diag: &mut Diagnostics) {
        if let Some(result) = self.hooks.run(point, &context).await
            && !result.success
        {
            diag.warn(Warning::hook(result.describe_failure(point)));
        }
    }

    async fn notify(
        &self,
        kind: NotificationKind,
        environment: &EnvironmentName,
        version: &Version,
        message: impl Into<String>,
        diag: &mut Diagnostics,
    ) {
        let notification = Notification::new(
            kind,
            &self.config.application,
            environment,
            version,
            message,
        );
        for failure in self.notifier.broadcast(&notification).await {
            diag.warn(Warning::notification(format!(
                "{} notification failed: {}",
                failure.notifier, failure.error
            )));
        }
    }
}

/// Drive a deployment through its states. On a failure after apply, restore
/// `restore_to` when given.
async fn execute(
    deployment: Deployment<Initialized>,
    restore_to: Option<&ReleaseRecord>,
) -> std::result::Result<Deployment<Finalized>, ExecutionFailure> {
    let deployment = deployment.precheck().await.map_err(|error| ExecutionFailure {
        error,
        rollback: None,
    })?;

    let (applied, error) = match deployment.apply().await {
        Ok(applied) => match applied.verify().await {
            Ok(verified) => return Ok(verified.finalize()),
            Err(failed) => failed,
        },
        Err(failed) => failed,
    };

    let rollback = match restore_to {
        Some(previous) => Some(
            applied
                .rollback(previous)
                .await
                .map(|rolled_back| rolled_back.restored_version().clone()),
        ),
        None => {
            tracing::warn!(
                environment = %applied.environment(),
                "No release to roll back to"
            );
            None
        }
    };

    Err(ExecutionFailure { error, rollback })
}

/// Open (or re-check) the promotion of `version` into `env`. Returns its
/// stage when it was newly opened.
fn open_promotion(
    ledger: &mut Ledger,
    env: &EnvironmentConfig,
    version: &Version,
    config: &Config,
) -> std::result::Result<Option<Stage>, PromotionError> {
    let is_new = ledger.promotion(&env.name, version).is_none();
    let stage = ledger.open(env, version, config)?.stage;
    Ok(is_new.then_some(stage))
}

fn parse_version(version: &str) -> Result<Version> {
    Version::parse(version).map_err(|e| {
        ValidationError {
            violations: vec![Violation::InvalidVersion(e)],
        }
        .into()
    })
}
