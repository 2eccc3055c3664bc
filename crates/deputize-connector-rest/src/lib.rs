//! # REST adapters
//!
//! HTTP-backed roster source, sinks and notifier for deputize.
//!
//! - [`PagerDutySource`] - on-call roster from PagerDuty schedules
//! - [`GitlabSink`] - Gitlab group membership
//! - [`SlackTopicSink`] - on-call mentions in a Slack channel topic
//! - [`SlackNotifier`] - change announcements in Slack channels
//!
//! ## Example
//!
//! ```ignore
//! use deputize_connector_rest::{GitlabConfig, GitlabSink};
//!
//! let sink = GitlabSink::new(
//!     GitlabConfig::new("https://gitlab.example.com/", "ops/approvers").with_token(token),
//! )?;
//! ```

pub mod client;
pub mod gitlab;
pub mod pagerduty;
pub mod slack;

pub use client::{ApiClient, AuthScheme};
pub use gitlab::{GitlabConfig, GitlabSink};
pub use pagerduty::{PagerDutyConfig, PagerDutySource, DEFAULT_PAGERDUTY_API_URL};
pub use slack::{SlackApi, SlackConfig, SlackNotifier, SlackTopicSink, DEFAULT_SLACK_API_URL};
