//! Slack channel topic sink.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use deputize_core::error::{with_timeout, SinkResult};
use deputize_core::identity::{ResolvedIdentity, RosterEntry};
use deputize_core::mutation::MutationResult;
use deputize_core::snapshot::MembershipSnapshot;
use deputize_core::traits::{IdentityResolver, Sink, SinkMutator, SnapshotReader};
use deputize_core::types::{SinkHandle, SinkKind, SinkPolicy};
use deputize_core::MutationPlan;

use super::api::SlackApi;
use super::topic::{render_oncall_line, render_topic, ChannelTopic};
use super::SlackConfig;

/// Keeps the on-call mentions in one channel's topic current.
///
/// The whole topic is rewritten in one call, so every change in a plan
/// shares the outcome of that call.
#[derive(Debug)]
pub struct SlackTopicSink {
    api: SlackApi,
    channel: String,
    name: String,
    topic_prefix: String,
    post_message: bool,
    policy: SinkPolicy,
}

impl SlackTopicSink {
    /// Create a sink for `channel`.
    pub fn new(api: SlackApi, config: &SlackConfig, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        Self {
            api,
            name: format!("slack:{channel}"),
            channel,
            topic_prefix: config.topic_prefix.clone(),
            post_message: config.post_message,
            policy: SinkPolicy {
                skip_unresolved: config.skip_unresolved,
                skip_when_empty: false,
            },
        }
    }

    /// Channel ID this sink manages.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Sink for SlackTopicSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Slack
    }

    fn policy(&self) -> SinkPolicy {
        self.policy
    }
}

#[async_trait]
impl IdentityResolver for SlackTopicSink {
    #[instrument(skip(self), fields(sink = %self.name))]
    async fn lookup(&self, entry: &RosterEntry) -> SinkResult<Vec<ResolvedIdentity>> {
        Ok(self
            .api
            .lookup_user_by_email(entry.as_str())
            .await?
            .map(|user| ResolvedIdentity::new(user.id).with_label(user.name))
            .into_iter()
            .collect())
    }
}

#[async_trait]
impl SnapshotReader for SlackTopicSink {
    #[instrument(skip(self), fields(sink = %self.name))]
    async fn read_snapshot(&self) -> SinkResult<MembershipSnapshot> {
        let raw = self.api.conversation_topic(&self.channel).await?;
        let topic = ChannelTopic::parse(&raw);
        let members = topic.members();

        info!(channel = %self.channel, members = members.len(), "Read Slack channel topic");

        let mut handle = SinkHandle::new(self.channel.clone());
        if let Some(suffix) = topic.suffix {
            handle = handle.with_detail(suffix);
        }
        Ok(MembershipSnapshot::new(handle, members))
    }
}

#[async_trait]
impl SinkMutator for SlackTopicSink {
    #[instrument(skip(self, snapshot, plan), fields(sink = %self.name))]
    async fn apply(
        &self,
        snapshot: &MembershipSnapshot,
        plan: &MutationPlan,
        call_timeout: Duration,
    ) -> MutationResult {
        let channel = &snapshot.handle.target;
        let members = plan.resulting_members(&snapshot.members);
        let topic = render_topic(&self.topic_prefix, &members, snapshot.handle.detail.as_deref());

        let outcome = with_timeout("set topic", call_timeout, self.api.set_topic(channel, &topic)).await;
        if outcome.is_ok() {
            info!(channel = %channel, topic = %topic, "Updated Slack channel topic");

            if self.post_message {
                let line = render_oncall_line(&self.topic_prefix, &members);
                let posted =
                    with_timeout("post message", call_timeout, self.api.post_message(channel, &line))
                        .await;
                if let Err(e) = posted {
                    warn!(channel = %snapshot.handle.target, error = %e, "Failed to post on-call message");
                }
            }
        }

        MutationResult::from_bulk(plan, outcome)
    }
}
