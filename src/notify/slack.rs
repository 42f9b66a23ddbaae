// ABOUTME: Slack incoming-webhook notifier.
// ABOUTME: Good news goes to the success channel, failures and rollbacks to the failure channel.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{EnvValue, SlackConfig};

use super::{Notification, NotificationKind, Notifier, NotifyError};

#[derive(Debug, Clone)]
pub struct SlackNotifier {
    client: reqwest::Client,
    webhook: EnvValue,
    success_channel: String,
    failure_channel: String,
    username: Option<String>,
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    channel: &'a str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
}

impl SlackNotifier {
    pub fn new(webhook: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook: EnvValue::Literal(webhook.into()),
            success_channel: "#deployments".to_string(),
            failure_channel: "#failures".to_string(),
            username: None,
        }
    }

    /// The webhook is resolved on every send, so an unset variable only
    /// costs the notification.
    pub fn from_config(config: &SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook: config.webhook.clone(),
            success_channel: config.success_channel.clone(),
            failure_channel: config.failure_channel.clone(),
            username: config.username.clone(),
        }
    }

    fn webhook_url(&self) -> Result<String, NotifyError> {
        self.webhook.resolve().map_err(|e| match e {
            crate::error::Error::MissingEnvVar(var) => NotifyError::MissingEnvVar(var),
            other => NotifyError::MissingEnvVar(other.to_string()),
        })
    }

    pub fn channel_for(&self, kind: NotificationKind) -> &str {
        match kind {
            NotificationKind::Succeeded | NotificationKind::ApprovalRequired => {
                &self.success_channel
            }
            NotificationKind::Failed | NotificationKind::RolledBack => &self.failure_channel,
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let webhook = self.webhook_url()?;
        let payload = Payload {
            channel: self.channel_for(notification.kind),
            text: notification.summary(),
            username: self.username.as_deref(),
        };

        let response = self.client.post(&webhook).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(channel = payload.channel, "Slack notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_outcome() {
        let slack = SlackNotifier::new("http://localhost/hook");
        assert_eq!(slack.channel_for(NotificationKind::Succeeded), "#deployments");
        assert_eq!(
            slack.channel_for(NotificationKind::ApprovalRequired),
            "#deployments"
        );
        assert_eq!(slack.channel_for(NotificationKind::Failed), "#failures");
        assert_eq!(slack.channel_for(NotificationKind::RolledBack), "#failures");
    }

    #[test]
    fn webhook_from_missing_variable_fails_at_send() {
        let config: SlackConfig =
            serde_yaml::from_str("webhook: { env: SHIPWRIGHT_TEST_SLACK_HOOK }").unwrap();
        temp_env::with_var_unset("SHIPWRIGHT_TEST_SLACK_HOOK", || {
            let slack = SlackNotifier::from_config(&config);
            let err = slack.webhook_url().unwrap_err();
            assert!(matches!(err, NotifyError::MissingEnvVar(ref v) if v == "SHIPWRIGHT_TEST_SLACK_HOOK"));
        });
    }

    #[test]
    fn webhook_variable_is_read_when_sending() {
        let config: SlackConfig =
            serde_yaml::from_str("webhook: { env: SHIPWRIGHT_TEST_SLACK_LATE }").unwrap();
        let slack = temp_env::with_var_unset("SHIPWRIGHT_TEST_SLACK_LATE", || {
            SlackNotifier::from_config(&config)
        });
        temp_env::with_var("SHIPWRIGHT_TEST_SLACK_LATE", Some("http://hooks.local/x"), || {
            assert_eq!(slack.webhook_url().unwrap(), "http://hooks.local/x");
        });
    }
}
