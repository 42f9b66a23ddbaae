// ABOUTME: The promotion ledger: per-environment promotions and release history.
// ABOUTME: All stage changes and release outcomes for one application live here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ApprovalPolicy, Config, EnvironmentConfig};
use crate::types::{AppName, ArtifactRef, DeploymentId, EnvironmentName, Version};

use super::stage::{Stage, StageTransition, validate_transition};
use super::PromotionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub approver: String,
    pub at: DateTime<Utc>,
}

/// One version moving into one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub version: Version,
    pub environment: EnvironmentName,
    pub stage: Stage,
    #[serde(default)]
    pub approvals: Vec<Approval>,
    #[serde(default)]
    pub history: Vec<StageTransition>,
    pub opened_at: DateTime<Utc>,
}

impl Promotion {
    fn new(environment: EnvironmentName, version: Version) -> Self {
        Self {
            version,
            environment,
            stage: Stage::Pending,
            approvals: Vec::new(),
            history: Vec::new(),
            opened_at: Utc::now(),
        }
    }

    fn transition(&mut self, to: Stage, reason: impl Into<String>) -> Result<(), PromotionError> {
        validate_transition(self.stage, to)?;
        let reason = reason.into();
        tracing::debug!(
            environment = %self.environment,
            version = %self.version,
            from = %self.stage,
            to = %to,
            "{reason}"
        );
        self.history.push(StageTransition {
            from: self.stage,
            to,
            reason,
            at: Utc::now(),
        });
        self.stage = to;
        Ok(())
    }

    fn has_approval_from(&self, approver: &str) -> bool {
        self.approvals.iter().any(|a| a.approver == approver)
    }
}

/// Progress toward an approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApprovalStatus {
    pub have: usize,
    pub need: usize,
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    InProgress,
    Succeeded,
    Failed,
    RolledBack,
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReleaseStatus::InProgress => "in progress",
            ReleaseStatus::Succeeded => "succeeded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

/// One deployment attempt in one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub deployment_id: DeploymentId,
    pub version: Version,
    pub artifact: ArtifactRef,
    pub status: ReleaseStatus,
    pub actor: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when this release was restored by rolling back from another version.
    #[serde(default)]
    pub rolled_back_from: Option<Version>,
}

impl ReleaseRecord {
    pub fn start(version: Version, artifact: ArtifactRef, actor: impl Into<String>) -> Self {
        Self {
            deployment_id: DeploymentId::generate(),
            version,
            artifact,
            status: ReleaseStatus::InProgress,
            actor: actor.into(),
            started_at: Utc::now(),
            finished_at: None,
            rolled_back_from: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub application: AppName,
    #[serde(default)]
    promotions: Vec<Promotion>,
    #[serde(default)]
    releases: BTreeMap<EnvironmentName, Vec<ReleaseRecord>>,
}

impl Ledger {
    pub fn new(application: AppName) -> Self {
        Self {
            application,
            promotions: Vec::new(),
            releases: BTreeMap::new(),
        }
    }

    pub fn promotion(&self, env: &EnvironmentName, version: &Version) -> Option<&Promotion> {
        self.promotions
            .iter()
            .find(|p| &p.environment == env && &p.version == version)
    }

    fn promotion_mut(
        &mut self,
        env: &EnvironmentName,
        version: &Version,
    ) -> Result<&mut Promotion, PromotionError> {
        self.promotions
            .iter_mut()
            .find(|p| &p.environment == env && &p.version == version)
            .ok_or_else(|| PromotionError::UnknownPromotion {
                environment: env.to_string(),
                version: version.to_string(),
            })
    }

    pub fn promotions(&self, env: &EnvironmentName) -> impl Iterator<Item = &Promotion> {
        self.promotions.iter().filter(move |p| &p.environment == env)
    }

    /// Promotions that have not started deploying yet.
    pub fn pending_promotions(&self, env: &EnvironmentName) -> impl Iterator<Item = &Promotion> {
        self.promotions(env).filter(|p| p.stage.is_pending())
    }

    /// Whether `version` currently counts as deployed in `env`.
    ///
    /// A version that was rolled back out of an environment no longer counts.
    pub fn is_deployed(&self, env: &EnvironmentName, version: &Version) -> bool {
        self.promotion(env, version)
            .is_some_and(|p| p.stage == Stage::Deployed)
    }

    /// Start tracking `version` in `env`, enforcing environment order.
    ///
    /// Opening an existing promotion re-checks the order and returns it unchanged.
    pub fn open(
        &mut self,
        env: &EnvironmentConfig,
        version: &Version,
        config: &Config,
    ) -> Result<&Promotion, PromotionError> {
        if config.requires_promotion(env)
            && let Some(previous) = config.previous_environment(&env.name)
            && !self.is_deployed(&previous.name, version)
        {
            return Err(PromotionError::NotPromoted {
                version: version.to_string(),
                environment: env.name.to_string(),
                required: previous.name.to_string(),
            });
        }

        let index = match self
            .promotions
            .iter()
            .position(|p| p.environment == env.name && &p.version == version)
        {
            Some(index) => index,
            None => {
                let mut promotion = Promotion::new(env.name.clone(), version.clone());
                if env.approval.is_some() {
                    promotion.transition(Stage::AwaitingApproval, "approval required")?;
                }
                tracing::info!(environment = %env.name, %version, stage = %promotion.stage, "Opened promotion");
                self.promotions.push(promotion);
                self.promotions.len() - 1
            }
        };

        Ok(&self.promotions[index])
    }

    /// Record an approval. Reaching the policy's threshold moves the promotion to `Approved`.
    pub fn approve(
        &mut self,
        env: &EnvironmentName,
        version: &Version,
        approver: &str,
        policy: Option<&ApprovalPolicy>,
    ) -> Result<ApprovalStatus, PromotionError> {
        let policy = policy.ok_or_else(|| PromotionError::NoApprovalGate {
            environment: env.to_string(),
        })?;

        if !policy.allows(approver) {
            return Err(PromotionError::UnauthorizedApprover {
                approver: approver.to_string(),
                environment: env.to_string(),
            });
        }

        let promotion = self.promotion_mut(env, version)?;

        if promotion.has_approval_from(approver) {
            return Err(PromotionError::DuplicateApproval {
                approver: approver.to_string(),
                environment: env.to_string(),
                version: version.to_string(),
            });
        }

        if promotion.stage != Stage::AwaitingApproval {
            return Err(PromotionError::NotAwaitingApproval {
                environment: env.to_string(),
                version: version.to_string(),
                stage: promotion.stage,
            });
        }

        promotion.approvals.push(Approval {
            approver: approver.to_string(),
            at: Utc::now(),
        });

        let need = policy.required as usize;
        let have = promotion.approvals.len();
        if have >= need {
            promotion.transition(Stage::Approved, format!("approved by {approver}"))?;
        }

        Ok(ApprovalStatus {
            have,
            need,
            approved: have >= need,
        })
    }

    /// Move a promotion into `Deploying`.
    ///
    /// A promotion still `Deploying` from an interrupted run is failed first.
    pub fn begin(
        &mut self,
        env: &EnvironmentName,
        version: &Version,
        policy: Option<&ApprovalPolicy>,
    ) -> Result<(), PromotionError> {
        let promotion = self.promotion_mut(env, version)?;

        match promotion.stage {
            Stage::AwaitingApproval => {
                return Err(PromotionError::ApprovalRequired {
                    environment: env.to_string(),
                    version: version.to_string(),
                    have: promotion.approvals.len(),
                    need: policy.map_or(1, |p| p.required as usize),
                });
            }
            Stage::Deploying => {
                tracing::warn!(environment = %env, %version, "Previous deployment was interrupted");
                promotion.transition(Stage::Failed, "interrupted")?;
                self.fail_interrupted_releases(env);
            }
            _ => {}
        }

        let promotion = self.promotion_mut(env, version)?;
        promotion.transition(Stage::Deploying, "deployment started")
    }

    pub fn finish(
        &mut self,
        env: &EnvironmentName,
        version: &Version,
        succeeded: bool,
    ) -> Result<(), PromotionError> {
        let promotion = self.promotion_mut(env, version)?;
        if succeeded {
            promotion.transition(Stage::Deployed, "deployment succeeded")
        } else {
            promotion.transition(Stage::Failed, "deployment failed")
        }
    }

    pub fn mark_rolled_back(
        &mut self,
        env: &EnvironmentName,
        version: &Version,
    ) -> Result<(), PromotionError> {
        self.promotion_mut(env, version)?
            .transition(Stage::RolledBack, "rolled back")
    }

    /// Mark a version deployed again after a rollback restored it.
    pub fn restore(&mut self, env: &EnvironmentName, version: &Version) -> Result<(), PromotionError> {
        if self.promotion(env, version).is_none() {
            self.promotions
                .push(Promotion::new(env.clone(), version.clone()));
        }
        let promotion = self.promotion_mut(env, version)?;

        if promotion.stage == Stage::Deployed {
            return Ok(());
        }
        if promotion.stage != Stage::Deploying {
            promotion.transition(Stage::Deploying, "restored by rollback")?;
        }
        promotion.transition(Stage::Deployed, "restored by rollback")
    }

    pub fn record_release(&mut self, env: &EnvironmentName, record: ReleaseRecord) {
        self.releases.entry(env.clone()).or_default().push(record);
    }

    /// Set the status of a release. The first completion fixes `finished_at`.
    pub fn complete_release(
        &mut self,
        env: &EnvironmentName,
        deployment_id: &DeploymentId,
        status: ReleaseStatus,
    ) {
        if let Some(record) = self
            .releases
            .get_mut(env)
            .and_then(|records| records.iter_mut().find(|r| &r.deployment_id == deployment_id))
        {
            record.status = status;
            record.finished_at.get_or_insert_with(Utc::now);
        }
    }

    fn fail_interrupted_releases(&mut self, env: &EnvironmentName) {
        if let Some(records) = self.releases.get_mut(env) {
            for record in records
                .iter_mut()
                .filter(|r| r.status == ReleaseStatus::InProgress)
            {
                record.status = ReleaseStatus::Failed;
                record.finished_at = Some(Utc::now());
            }
        }
    }

    /// Releases for `env`, oldest first.
    pub fn history(&self, env: &EnvironmentName) -> &[ReleaseRecord] {
        self.releases.get(env).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The release currently running in `env`: its most recent success.
    pub fn current_release(&self, env: &EnvironmentName) -> Option<&ReleaseRecord> {
        self.history(env)
            .iter()
            .rev()
            .find(|r| r.status == ReleaseStatus::Succeeded)
    }

    /// Artifact of the most recent successful release of `version` in `env`.
    pub fn artifact_for(&self, env: &EnvironmentName, version: &Version) -> Option<&ArtifactRef> {
        self.history(env)
            .iter()
            .rev()
            .find(|r| &r.version == version && r.status == ReleaseStatus::Succeeded)
            .map(|r| &r.artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_yaml(
            r#"
application: shop
artifact: shop:{version}
environments:
  - name: dev
    apply: "true"
  - name: staging
    apply: "true"
  - name: production
    apply: "true"
    approval:
      required: 2
      approvers: [alice, bob, carol]
"#,
        )
        .unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn env(s: &str) -> EnvironmentName {
        EnvironmentName::new(s).unwrap()
    }

    fn deploy(ledger: &mut Ledger, config: &Config, name: &str, version: &Version) {
        let env_config = config.environment(name).unwrap();
        ledger.open(env_config, version, config).unwrap();
        ledger.begin(&env_config.name, version, None).unwrap();
        ledger.finish(&env_config.name, version, true).unwrap();
    }

    #[test]
    fn first_environment_needs_no_promotion() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        let promotion = ledger
            .open(config.environment("dev").unwrap(), &v("1.0.0"), &config)
            .unwrap();
        assert_eq!(promotion.stage, Stage::Pending);
    }

    #[test]
    fn skipping_an_environment_is_refused() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        deploy(&mut ledger, &config, "dev", &v("1.0.0"));

        let err = ledger
            .open(config.environment("production").unwrap(), &v("1.0.0"), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            PromotionError::NotPromoted { ref required, .. } if required == "staging"
        ));
    }

    #[test]
    fn rollback_upstream_revokes_promotion() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        deploy(&mut ledger, &config, "dev", &v("1.0.0"));
        ledger.mark_rolled_back(&env("dev"), &v("1.0.0")).unwrap();

        let err = ledger
            .open(config.environment("staging").unwrap(), &v("1.0.0"), &config)
            .unwrap_err();
        assert!(matches!(err, PromotionError::NotPromoted { .. }));
    }

    #[test]
    fn approval_gate_blocks_until_threshold() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        let version = v("1.0.0");
        deploy(&mut ledger, &config, "dev", &version);
        deploy(&mut ledger, &config, "staging", &version);

        let production = config.environment("production").unwrap();
        let policy = production.approval.as_ref();
        let promotion = ledger.open(production, &version, &config).unwrap();
        assert_eq!(promotion.stage, Stage::AwaitingApproval);

        let err = ledger.begin(&production.name, &version, policy).unwrap_err();
        assert!(matches!(
            err,
            PromotionError::ApprovalRequired { have: 0, need: 2, .. }
        ));

        let status = ledger
            .approve(&production.name, &version, "alice", policy)
            .unwrap();
        assert_eq!(status, ApprovalStatus { have: 1, need: 2, approved: false });

        let err = ledger
            .approve(&production.name, &version, "alice", policy)
            .unwrap_err();
        assert!(matches!(err, PromotionError::DuplicateApproval { .. }));

        let err = ledger
            .approve(&production.name, &version, "mallory", policy)
            .unwrap_err();
        assert!(matches!(err, PromotionError::UnauthorizedApprover { .. }));

        let status = ledger
            .approve(&production.name, &version, "bob", policy)
            .unwrap();
        assert!(status.approved);

        ledger.begin(&production.name, &version, policy).unwrap();
        assert_eq!(
            ledger.promotion(&production.name, &version).unwrap().stage,
            Stage::Deploying
        );
    }

    #[test]
    fn approving_without_gate_is_refused() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        ledger
            .open(config.environment("dev").unwrap(), &v("1.0.0"), &config)
            .unwrap();
        let err = ledger
            .approve(&env("dev"), &v("1.0.0"), "alice", None)
            .unwrap_err();
        assert!(matches!(err, PromotionError::NoApprovalGate { .. }));
    }

    #[test]
    fn failed_deployment_keeps_approvals() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        let version = v("1.0.0");
        deploy(&mut ledger, &config, "dev", &version);
        deploy(&mut ledger, &config, "staging", &version);

        let production = config.environment("production").unwrap();
        let policy = production.approval.as_ref();
        ledger.open(production, &version, &config).unwrap();
        ledger.approve(&production.name, &version, "alice", policy).unwrap();
        ledger.approve(&production.name, &version, "bob", policy).unwrap();
        ledger.begin(&production.name, &version, policy).unwrap();
        ledger.finish(&production.name, &version, false).unwrap();

        ledger.open(production, &version, &config).unwrap();
        ledger.begin(&production.name, &version, policy).unwrap();
        let promotion = ledger.promotion(&production.name, &version).unwrap();
        assert_eq!(promotion.approvals.len(), 2);
        assert_eq!(promotion.stage, Stage::Deploying);
    }

    #[test]
    fn interrupted_deployment_is_failed_on_next_begin() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        let dev = config.environment("dev").unwrap();
        let version = v("1.0.0");
        ledger.open(dev, &version, &config).unwrap();
        ledger.begin(&dev.name, &version, None).unwrap();
        let record = ReleaseRecord::start(version.clone(), ArtifactRef::parse("shop:1.0.0").unwrap(), "ci");
        ledger.record_release(&dev.name, record);

        ledger.begin(&dev.name, &version, None).unwrap();

        let promotion = ledger.promotion(&dev.name, &version).unwrap();
        let stages: Vec<_> = promotion.history.iter().map(|t| t.to).collect();
        assert_eq!(stages, vec![Stage::Deploying, Stage::Failed, Stage::Deploying]);
        assert_eq!(ledger.history(&dev.name)[0].status, ReleaseStatus::Failed);
    }

    #[test]
    fn current_release_is_latest_success() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        let dev = env("dev");

        for (version, status) in [
            ("1.0.0", ReleaseStatus::Succeeded),
            ("1.1.0", ReleaseStatus::Succeeded),
            ("1.2.0", ReleaseStatus::Failed),
        ] {
            let record = ReleaseRecord::start(
                v(version),
                ArtifactRef::parse(&format!("shop:{version}")).unwrap(),
                "ci",
            );
            let id = record.deployment_id.clone();
            ledger.record_release(&dev, record);
            ledger.complete_release(&dev, &id, status);
        }

        assert_eq!(ledger.current_release(&dev).unwrap().version, v("1.1.0"));
        assert_eq!(
            ledger.artifact_for(&dev, &v("1.0.0")).unwrap().to_string(),
            "shop:1.0.0"
        );
        assert!(ledger.artifact_for(&dev, &v("1.2.0")).is_none());
        assert_eq!(ledger.history(&dev).len(), 3);

        let id = ledger.current_release(&dev).unwrap().deployment_id.clone();
        ledger.complete_release(&dev, &id, ReleaseStatus::RolledBack);
        assert!(ledger.artifact_for(&dev, &v("1.1.0")).is_none());
        assert!(ledger.history(&env("staging")).is_empty());
    }

    #[test]
    fn restore_moves_rolled_back_version_to_deployed() {
        let config = config();
        let mut ledger = Ledger::new(config.application.clone());
        let dev = env("dev");
        deploy(&mut ledger, &config, "dev", &v("1.0.0"));
        ledger.mark_rolled_back(&dev, &v("1.0.0")).unwrap();

        ledger.restore(&dev, &v("1.0.0")).unwrap();
        assert!(ledger.is_deployed(&dev, &v("1.0.0")));

        ledger.restore(&dev, &v("0.9.0")).unwrap();
        assert!(ledger.is_deployed(&dev, &v("0.9.0")));
    }
}
