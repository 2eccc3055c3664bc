//! PagerDuty roster source
//!
//! Finds schedules by name and unions the users on call for each of them
//! during the requested window.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use deputize_core::error::{ReconcileError, SinkError, SinkResult};
use deputize_core::identity::{roster_from, Roster};
use deputize_core::traits::RosterSource;
use deputize_core::types::TimeWindow;

use crate::client::{ApiClient, AuthScheme};

/// Default PagerDuty REST API root.
pub const DEFAULT_PAGERDUTY_API_URL: &str = "https://api.pagerduty.com/";

const PAGERDUTY_ACCEPT: &str = "application/vnd.pagerduty+json;version=2";
const PAGE_LIMIT: u32 = 100;
const MAX_PAGES: u32 = 100;

/// Longest on-call window accepted, one week.
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// PagerDuty source configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct PagerDutyConfig {
    /// Whether the roster comes from PagerDuty.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Exact names of the schedules whose on-call users form the roster.
    #[serde(default)]
    pub schedules: Vec<String>,

    /// The token is an OAuth access token rather than a REST API key.
    #[serde(default)]
    pub with_oauth: bool,

    /// REST API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Length of the on-call window starting now.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API token, filled in from the secret bundle.
    #[serde(skip)]
    pub token: Option<String>,
}

impl std::fmt::Debug for PagerDutyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagerDutyConfig")
            .field("enabled", &self.enabled)
            .field("schedules", &self.schedules)
            .field("with_oauth", &self.with_oauth)
            .field("base_url", &self.base_url)
            .field("window_secs", &self.window_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_PAGERDUTY_API_URL.to_string()
}

fn default_window_secs() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for PagerDutyConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            schedules: Vec::new(),
            with_oauth: false,
            base_url: default_base_url(),
            window_secs: default_window_secs(),
            timeout_secs: default_timeout_secs(),
            token: None,
        }
    }
}

impl PagerDutyConfig {
    /// On-call window length, clamped to `1..=MAX_WINDOW_SECS` seconds.
    #[must_use]
    pub fn window(&self) -> chrono::TimeDelta {
        let secs = i64::try_from(self.window_secs.clamp(1, MAX_WINDOW_SECS)).unwrap_or(1);
        chrono::TimeDelta::try_seconds(secs).unwrap_or_else(|| chrono::TimeDelta::seconds(1))
    }

    /// Every problem with the configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.schedules.iter().all(|s| s.trim().is_empty()) {
            problems.push("no schedules configured".to_string());
        }
        if self.window_secs == 0 {
            problems.push("window_secs must be greater than 0".to_string());
        }
        if self.window_secs > MAX_WINDOW_SECS {
            problems.push(format!(
                "window_secs must be at most {MAX_WINDOW_SECS} (one week)"
            ));
        }
        problems
    }
}

#[derive(Debug, Deserialize)]
struct ScheduleList {
    #[serde(default)]
    schedules: Vec<Schedule>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct Schedule {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleUsers {
    #[serde(default)]
    users: Vec<OnCallUser>,
}

#[derive(Debug, Deserialize)]
struct OnCallUser {
    #[serde(default)]
    email: String,
}

/// Roster source backed by PagerDuty schedules.
#[derive(Debug)]
pub struct PagerDutySource {
    client: ApiClient,
}

impl PagerDutySource {
    /// Create a source from configuration.
    pub fn new(config: &PagerDutyConfig) -> SinkResult<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| SinkError::invalid_config("pagerduty token not provided"))?;
        let auth = if config.with_oauth {
            AuthScheme::Bearer(token)
        } else {
            AuthScheme::TokenToken(token)
        };
        let client = ApiClient::new(
            "pagerduty",
            &config.base_url,
            auth,
            Duration::from_secs(config.timeout_secs),
        )?
        .with_accept(PAGERDUTY_ACCEPT);

        Ok(Self { client })
    }

    /// Schedules whose name matches `name` exactly, across all result pages.
    async fn find_schedules(&self, name: &str) -> SinkResult<Vec<Schedule>> {
        let limit = PAGE_LIMIT.to_string();
        let mut matches = Vec::new();

        for page in 0..MAX_PAGES {
            let offset = (page * PAGE_LIMIT).to_string();
            let list: ScheduleList = self
                .client
                .get_json(
                    "schedules",
                    &[
                        ("query", name),
                        ("limit", limit.as_str()),
                        ("offset", offset.as_str()),
                        ("total", "true"),
                    ],
                    "list schedules",
                )
                .await?;

            matches.extend(list.schedules.into_iter().filter(|s| s.name == name));

            if !list.more {
                break;
            }
        }

        Ok(matches)
    }

    /// Emails of the users on call for a schedule during `window`.
    async fn on_call_emails(&self, schedule: &Schedule, window: &TimeWindow) -> SinkResult<Vec<String>> {
        let since = window.since.to_rfc3339_opts(SecondsFormat::Secs, true);
        let until = window.until.to_rfc3339_opts(SecondsFormat::Secs, true);
        let path = format!("schedules/{}/users", schedule.id);

        let users: ScheduleUsers = self
            .client
            .get_json(
                &path,
                &[("since", since.as_str()), ("until", until.as_str())],
                "list on-call users",
            )
            .await?;

        Ok(users
            .users
            .into_iter()
            .map(|u| u.email)
            .filter(|e| !e.trim().is_empty())
            .collect())
    }
}

fn unavailable(message: impl Into<String>, source: SinkError) -> ReconcileError {
    ReconcileError::roster_unavailable_with_source(message, source)
}

#[async_trait]
impl RosterSource for PagerDutySource {
    fn name(&self) -> &str {
        "pagerduty"
    }

    #[instrument(skip(self, window), fields(since = %window.since, until = %window.until))]
    async fn fetch_roster(&self, schedules: &[String], window: &TimeWindow) -> Result<Roster, ReconcileError> {
        let mut found: BTreeMap<String, Schedule> = BTreeMap::new();

        for name in schedules.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let matches = self
                .find_schedules(name)
                .await
                .map_err(|e| unavailable(format!("unable to list schedules matching {name}"), e))?;
            if matches.is_empty() {
                warn!(schedule = %name, "No PagerDuty schedule with this name");
            }
            for schedule in matches {
                found.insert(schedule.id.clone(), schedule);
            }
        }

        if found.is_empty() {
            return Err(ReconcileError::roster_unavailable(format!(
                "none of the configured schedules exist: {}",
                schedules.join(", ")
            )));
        }

        let mut emails = Vec::new();
        for schedule in found.values() {
            let on_call = self
                .on_call_emails(schedule, window)
                .await
                .map_err(|e| unavailable(format!("unable to list on-call users for {}", schedule.name), e))?;
            debug!(schedule = %schedule.name, users = ?on_call, "On-call users for schedule");
            emails.extend(on_call);
        }

        let roster = roster_from(emails);
        info!(
            schedules = found.len(),
            on_call = ?roster.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Fetched on-call roster"
        );
        Ok(roster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: PagerDutyConfig =
            serde_json::from_str(r#"{"schedules": ["Ops Primary"]}"#).unwrap();
        assert!(config.enabled);
        assert!(!config.with_oauth);
        assert_eq!(config.window_secs, 1);
        assert_eq!(config.window(), chrono::Duration::seconds(1));
        assert_eq!(config.base_url, "https://api.pagerduty.com/");
        assert!(config.problems().is_empty());
    }

    #[test]
    fn test_config_problems() {
        let config = PagerDutyConfig {
            window_secs: 0,
            ..PagerDutyConfig::default()
        };
        assert_eq!(config.problems().len(), 2);
    }

    #[test]
    fn test_oversized_window_rejected_without_panic() {
        let config = PagerDutyConfig {
            schedules: vec!["Ops Primary".to_string()],
            window_secs: u64::MAX,
            ..PagerDutyConfig::default()
        };
        let problems = config.problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("at most 604800"));
        assert_eq!(config.window(), chrono::TimeDelta::days(7));

        let week = PagerDutyConfig {
            window_secs: MAX_WINDOW_SECS,
            ..config
        };
        assert!(week.problems().is_empty());
        assert_eq!(week.window(), chrono::TimeDelta::days(7));
    }

    #[test]
    fn test_new_requires_token() {
        assert!(PagerDutySource::new(&PagerDutyConfig::default()).is_err());
    }
}
