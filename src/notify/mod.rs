// ABOUTME: Deployment notifications fanned out to every configured channel.
// ABOUTME: Failures to notify are reported back, never fatal to a deployment.

mod slack;

pub use slack::SlackNotifier;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::NotificationsConfig;
use crate::types::{AppName, EnvironmentName, Version};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Succeeded,
    Failed,
    RolledBack,
    ApprovalRequired,
}

impl NotificationKind {
    /// Whether this is bad news.
    pub fn is_failure(&self) -> bool {
        matches!(self, NotificationKind::Failed | NotificationKind::RolledBack)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Succeeded => "succeeded",
            NotificationKind::Failed => "failed",
            NotificationKind::RolledBack => "rolled back",
            NotificationKind::ApprovalRequired => "approval required",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub application: AppName,
    pub environment: EnvironmentName,
    pub version: Version,
    pub message: String,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        application: &AppName,
        environment: &EnvironmentName,
        version: &Version,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            application: application.clone(),
            environment: environment.clone(),
            version: version.clone(),
            message: message.into(),
        }
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let headline = match self.kind {
            NotificationKind::Succeeded => "Deployment succeeded",
            NotificationKind::Failed => "Deployment failed",
            NotificationKind::RolledBack => "Rolled back",
            NotificationKind::ApprovalRequired => "Approval required",
        };
        let mut text = format!(
            "{headline}: {} {} in {}",
            self.application, self.version, self.environment
        );
        if !self.message.is_empty() {
            text.push_str(" - ");
            text.push_str(&self.message);
        }
        text
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in warnings.
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Reports notifications through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if notification.kind.is_failure() {
            tracing::warn!(kind = %notification.kind, "{}", notification.summary());
        } else {
            tracing::info!(kind = %notification.kind, "{}", notification.summary());
        }
        Ok(())
    }
}

/// A notifier that could not deliver.
#[derive(Debug)]
pub struct NotifyFailure {
    pub notifier: String,
    pub error: NotifyError,
}

/// Sends each notification to every registered notifier.
#[derive(Clone, Default)]
pub struct NotificationHub {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.notifiers.iter().map(|n| n.name()).collect();
        f.debug_struct("NotificationHub")
            .field("notifiers", &names)
            .finish()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the notifiers named in config.
    pub fn from_config(config: &NotificationsConfig) -> Self {
        let mut hub = Self::new();
        if config.log {
            hub = hub.with(Arc::new(LogNotifier));
        }
        if let Some(slack) = &config.slack {
            hub = hub.with(Arc::new(SlackNotifier::from_config(slack)));
        }
        hub
    }

    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Send to all notifiers concurrently. Returns the ones that failed.
    pub async fn broadcast(&self, notification: &Notification) -> Vec<NotifyFailure> {
        let sends = self.notifiers.iter().map(|notifier| async move {
            notifier
                .notify(notification)
                .await
                .map_err(|error| NotifyFailure {
                    notifier: notifier.name().to_string(),
                    error,
                })
        });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(Result::err)
            .collect()
    }
}
