// ABOUTME: Notification channel configuration.
// ABOUTME: Slack webhook routing for success and failure, plus the tracing log sink.

use serde::Deserialize;

use super::EnvValue;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub slack: Option<SlackConfig>,

    /// Also report through the log.
    #[serde(default = "default_log")]
    pub log: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            slack: None,
            log: default_log(),
        }
    }
}

fn default_log() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackConfig {
    /// Incoming webhook URL, usually `{ env: SLACK_WEBHOOK_URL }`.
    pub webhook: EnvValue,

    #[serde(default = "default_success_channel")]
    pub success_channel: String,

    #[serde(default = "default_failure_channel")]
    pub failure_channel: String,

    #[serde(default)]
    pub username: Option<String>,
}

fn default_success_channel() -> String {
    "#deployments".to_string()
}

fn default_failure_channel() -> String {
    "#failures".to_string()
}
