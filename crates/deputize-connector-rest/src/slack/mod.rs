//! Slack integration
//!
//! - [`SlackTopicSink`] keeps the on-call mentions in a channel topic current
//! - [`SlackNotifier`] announces membership changes made to other sinks

mod api;
mod notifier;
mod sink;
pub mod topic;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use deputize_core::error::{SinkError, SinkResult};

pub use api::{SlackApi, SlackUser, DEFAULT_SLACK_API_URL};
pub use notifier::SlackNotifier;
pub use sink::SlackTopicSink;

/// Slack topic sink configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Whether the sink takes part in a pass.
    #[serde(default)]
    pub enabled: bool,

    /// Channel IDs whose topic carries the on-call line.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Post the on-call line as a message after a topic change.
    #[serde(default)]
    pub post_message: bool,

    /// Text in front of the mentions.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Continue when an on-call email has no Slack account.
    #[serde(default = "default_skip_unresolved")]
    pub skip_unresolved: bool,

    /// Slack Web API root.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bot token, filled in from the secret bundle.
    #[serde(skip)]
    pub token: Option<String>,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("enabled", &self.enabled)
            .field("channels", &self.channels)
            .field("post_message", &self.post_message)
            .field("topic_prefix", &self.topic_prefix)
            .field("skip_unresolved", &self.skip_unresolved)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

fn default_topic_prefix() -> String {
    "On-Call: ".to_string()
}

fn default_skip_unresolved() -> bool {
    true
}

fn default_api_url() -> String {
    DEFAULT_SLACK_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channels: Vec::new(),
            post_message: false,
            topic_prefix: default_topic_prefix(),
            skip_unresolved: default_skip_unresolved(),
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            token: None,
        }
    }
}

impl SlackConfig {
    /// Every problem with the configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.channels.iter().all(|c| c.trim().is_empty()) {
            problems.push("no channels configured".to_string());
        }
        if self.topic_prefix.contains('|') {
            problems.push("topic_prefix must not contain '|'".to_string());
        }
        problems
    }

    /// Build the API client from the configured token.
    pub fn api(&self) -> SinkResult<SlackApi> {
        let token = self
            .token
            .clone()
            .ok_or_else(|| SinkError::invalid_config("slack token not provided"))?;
        SlackApi::new(&self.api_url, token, Duration::from_secs(self.timeout_secs))
    }

    /// One topic sink per configured channel.
    pub fn sinks(&self) -> SinkResult<Vec<SlackTopicSink>> {
        let problems = self.problems();
        if !problems.is_empty() {
            return Err(SinkError::invalid_config(problems.join(", ")));
        }
        let api = self.api()?;
        Ok(self
            .channels
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|channel| SlackTopicSink::new(api.clone(), self, channel.trim()))
            .collect())
    }
}
