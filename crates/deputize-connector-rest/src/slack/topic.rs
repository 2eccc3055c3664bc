//! On-call channel topic parsing and rendering.
//!
//! A managed topic looks like `On-Call: <@U1>, <@U2> |free text`. Everything
//! before the first `|` belongs to deputize; everything after it is kept
//! verbatim.

use std::sync::LazyLock;

use regex::Regex;

use deputize_core::identity::{IdentitySet, ResolvedIdentity};

const DELIMITER: char = '|';

/// Slack user mention, capturing the user ID.
static MENTION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<@([UW][A-Z0-9]+)").expect("MENTION_REGEX is a valid regex pattern")
});

/// A channel topic split at the delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopic {
    /// Text before the first delimiter.
    pub head: String,
    /// Text after the first delimiter, when there is one.
    pub suffix: Option<String>,
}

impl ChannelTopic {
    /// Split a raw topic.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(DELIMITER) {
            Some((head, suffix)) => Self {
                head: head.to_string(),
                suffix: Some(suffix.to_string()),
            },
            None => Self {
                head: raw.to_string(),
                suffix: None,
            },
        }
    }

    /// Slack user IDs mentioned before the delimiter.
    #[must_use]
    pub fn members(&self) -> IdentitySet {
        MENTION_REGEX
            .captures_iter(&self.head)
            .filter_map(|c| c.get(1))
            .map(|m| ResolvedIdentity::new(m.as_str()))
            .collect()
    }
}

/// On-call line, e.g. `On-Call: <@U1>, <@U2>`.
#[must_use]
pub fn render_oncall_line(prefix: &str, members: &IdentitySet) -> String {
    let mentions: Vec<String> = members
        .iter()
        .map(|m| format!("<@{}>", m.value()))
        .collect();
    format!("{prefix}{}", mentions.join(", "))
}

/// Full topic with the preserved suffix.
#[must_use]
pub fn render_topic(prefix: &str, members: &IdentitySet, suffix: Option<&str>) -> String {
    format!(
        "{} {DELIMITER}{}",
        render_oncall_line(prefix, members),
        suffix.unwrap_or_default()
    )
}
