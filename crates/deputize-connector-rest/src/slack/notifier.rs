//! Posts membership changes to Slack channels.

use async_trait::async_trait;
use tracing::{debug, warn};

use deputize_core::error::SinkResult;
use deputize_core::report::MembershipChange;
use deputize_core::traits::ChangeNotifier;

use super::api::SlackApi;

/// Announces applied membership changes in one or more channels.
#[derive(Debug)]
pub struct SlackNotifier {
    api: SlackApi,
    channels: Vec<String>,
}

impl SlackNotifier {
    /// Create a notifier posting to `channels`.
    pub fn new(api: SlackApi, channels: Vec<String>) -> Self {
        Self { api, channels }
    }
}

#[async_trait]
impl ChangeNotifier for SlackNotifier {
    /// Posts to every channel; returns the first failure after trying all.
    async fn notify(&self, change: &MembershipChange) -> SinkResult<()> {
        let text = change.describe();
        let mut first_error = None;

        for channel in &self.channels {
            match self.api.post_message(channel, &text).await {
                Ok(()) => debug!(channel = %channel, sink = %change.sink, "Posted change notification"),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Failed to post change notification");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
