//! Minimal Slack Web API client.

use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use deputize_core::error::{SinkError, SinkResult};

use crate::client::{ApiClient, AuthScheme};

/// Default Slack Web API root.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api/";

/// A Slack user as returned by `users.lookupByEmail`.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: SlackUser,
}

#[derive(Debug, Deserialize)]
struct ChannelEnvelope {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    topic: Option<Topic>,
}

#[derive(Debug, Deserialize)]
struct Topic {
    #[serde(default)]
    value: String,
}

#[derive(Serialize)]
struct SetTopicRequest<'a> {
    channel: &'a str,
    topic: &'a str,
}

#[derive(Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

/// Slack Web API calls used by the topic sink and the change notifier.
#[derive(Debug, Clone)]
pub struct SlackApi {
    client: ApiClient,
}

impl SlackApi {
    /// Create a client authenticated with a bot token.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> SinkResult<Self> {
        Ok(Self {
            client: ApiClient::new("slack", base_url, AuthScheme::Bearer(token.into()), timeout)?,
        })
    }

    /// Look up a user by email. `Ok(None)` when Slack has no such user.
    pub async fn lookup_user_by_email(&self, email: &str) -> SinkResult<Option<SlackUser>> {
        let builder = self
            .client
            .request(Method::GET, "users.lookupByEmail")?
            .query(&[("email", email)]);
        match self.call::<UserEnvelope>(builder, "users.lookupByEmail").await {
            Ok(envelope) => Ok(Some(envelope.user)),
            Err(SlackCallError::Slack(code)) if code == "users_not_found" => Ok(None),
            Err(e) => Err(e.into_sink_error("users.lookupByEmail")),
        }
    }

    /// Current topic of a channel.
    pub async fn conversation_topic(&self, channel: &str) -> SinkResult<String> {
        let builder = self
            .client
            .request(Method::GET, "conversations.info")?
            .query(&[("channel", channel)]);
        let envelope: ChannelEnvelope = self
            .call(builder, "conversations.info")
            .await
            .map_err(|e| e.into_sink_error("conversations.info"))?;
        Ok(envelope
            .channel
            .topic
            .map(|t| t.value)
            .unwrap_or_default())
    }

    /// Replace a channel's topic.
    pub async fn set_topic(&self, channel: &str, topic: &str) -> SinkResult<()> {
        let builder = self
            .client
            .request(Method::POST, "conversations.setTopic")?
            .json(&SetTopicRequest { channel, topic });
        self.call::<Value>(builder, "conversations.setTopic")
            .await
            .map_err(|e| e.into_sink_error("conversations.setTopic"))?;
        Ok(())
    }

    /// Post a plain text message.
    pub async fn post_message(&self, channel: &str, text: &str) -> SinkResult<()> {
        let builder = self
            .client
            .request(Method::POST, "chat.postMessage")?
            .json(&PostMessageRequest { channel, text });
        self.call::<Value>(builder, "chat.postMessage")
            .await
            .map_err(|e| e.into_sink_error("chat.postMessage"))?;
        Ok(())
    }

    /// Send a call and unwrap Slack's `{"ok": ..., "error": ...}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        method: &str,
    ) -> Result<T, SlackCallError> {
        let response = self
            .client
            .send(builder, method)
            .await
            .map_err(SlackCallError::Transport)?;
        let body: Value = self
            .client
            .json(response, method)
            .await
            .map_err(SlackCallError::Transport)?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error")
                .to_string();
            debug!(method, error = %code, "Slack API returned an error");
            return Err(SlackCallError::Slack(code));
        }

        serde_json::from_value(body).map_err(|e| {
            SlackCallError::Transport(SinkError::invalid_data(format!(
                "slack: {method}: unexpected response: {e}"
            )))
        })
    }
}

enum SlackCallError {
    Transport(SinkError),
    Slack(String),
}

impl SlackCallError {
    fn into_sink_error(self, method: &str) -> SinkError {
        match self {
            SlackCallError::Transport(e) => e,
            SlackCallError::Slack(code) => map_slack_error(&code, method),
        }
    }
}

/// Map a Slack error code onto a sink error.
fn map_slack_error(code: &str, method: &str) -> SinkError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" | "token_expired" => {
            SinkError::AuthenticationFailed {
                message: format!("slack: {code}"),
            }
        }
        "missing_scope" | "not_in_channel" | "restricted_action" | "not_allowed_token_type" => {
            SinkError::AuthorizationFailed {
                operation: format!("slack {method} ({code})"),
            }
        }
        "channel_not_found" | "users_not_found" | "user_not_found" => SinkError::NotFound {
            identifier: format!("slack {method} ({code})"),
        },
        "ratelimited" | "fatal_error" | "service_unavailable" | "internal_error" => {
            SinkError::Unavailable {
                message: format!("slack {method}: {code}"),
            }
        }
        _ => SinkError::Api {
            status: 200,
            message: format!("slack {method}: {code}"),
        },
    }
}
