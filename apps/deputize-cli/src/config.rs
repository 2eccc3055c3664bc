//! Configuration file loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use deputize_connector_ldap::LdapSinkConfig;
use deputize_connector_rest::{GitlabConfig, PagerDutyConfig, SlackConfig};
use deputize_core::ReconcilerConfig;
use deputize_secrets::{numbered, SecretBundle, SecretRequirements, SecretsConfig};

use crate::error::{CliError, CliResult};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Where the on-call roster comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub pagerduty: PagerDutyConfig,
}

/// Downstream systems to reconcile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default)]
    pub ldap: Option<LdapSinkConfig>,
    #[serde(default)]
    pub gitlab: Option<GitlabConfig>,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
}

/// Channels that hear about membership changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackNotificationConfig {
    #[serde(default)]
    pub channels: Vec<String>,

    /// Bot token, filled in from the secret bundle.
    #[serde(skip)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub slack: Option<SlackNotificationConfig>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeputizeConfig {
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub reconcile: ReconcilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DeputizeConfig {
    /// Read and parse a config file. Does not validate.
    pub fn load(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("unable to read {}: {e}", path.display()))
        })?;
        Self::parse(&contents)
            .map_err(|e| CliError::Config(format!("unable to parse {}: {e}", path.display())))
    }

    /// Parse config JSON.
    pub fn parse(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Enabled LDAP sink config.
    pub fn ldap(&self) -> Option<&LdapSinkConfig> {
        self.sinks.ldap.as_ref().filter(|c| c.enabled)
    }

    /// Enabled Gitlab sink config.
    pub fn gitlab(&self) -> Option<&GitlabConfig> {
        self.sinks.gitlab.as_ref().filter(|c| c.enabled)
    }

    /// Enabled Slack sink config.
    pub fn slack(&self) -> Option<&SlackConfig> {
        self.sinks.slack.as_ref().filter(|c| c.enabled)
    }

    /// Channels for change notifications, if any.
    pub fn notification_channels(&self) -> Vec<String> {
        self.notifications
            .slack
            .as_ref()
            .map(|n| {
                n.channels
                    .iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every problem, each prefixed with the section it belongs to.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut section = |name: &str, found: Vec<String>| {
            problems.extend(found.into_iter().map(|p| format!("{name}: {p}")));
        };

        section("Secrets", self.secrets.problems());

        let pagerduty = &self.source.pagerduty;
        if pagerduty.enabled {
            section("PagerDuty Source", pagerduty.problems());
        } else {
            section(
                "PagerDuty Source",
                vec!["must be enabled, it is the only roster source".to_string()],
            );
        }

        if let Some(ldap) = self.ldap() {
            section("LDAP Sink", ldap.problems());
        }
        if let Some(gitlab) = self.gitlab() {
            section("Gitlab Sink", gitlab.problems());
        }
        if let Some(slack) = self.slack() {
            section("Slack Sink", slack.problems());
        }

        if self.ldap().is_none() && self.gitlab().is_none() && self.slack().is_none() {
            section("Sinks", vec!["no sink is enabled".to_string()]);
        }

        if self.reconcile.timeout_secs == 0 {
            section(
                "Reconcile",
                vec!["timeout_secs must be greater than 0".to_string()],
            );
        }

        problems
    }

    /// Validate the whole file, reporting every problem in one numbered message.
    pub fn validate(&self) -> CliResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CliError::Config(numbered(&problems)))
        }
    }

    /// Credentials the enabled source and sinks need.
    pub fn secret_requirements(&self) -> SecretRequirements {
        SecretRequirements {
            pagerduty: self.source.pagerduty.enabled,
            gitlab: self.gitlab().is_some(),
            ldap: self.ldap().is_some(),
            slack: self.slack().is_some() || !self.notification_channels().is_empty(),
        }
    }

    /// Copy loaded credentials into the source and sink configs.
    pub fn apply_secrets(&mut self, secrets: &SecretBundle) {
        self.source.pagerduty.token = secrets.pagerduty();
        if let Some(ldap) = self.sinks.ldap.as_mut() {
            ldap.bind_password = secrets.ldap();
        }
        if let Some(gitlab) = self.sinks.gitlab.as_mut() {
            gitlab.token = secrets.gitlab();
        }
        if let Some(slack) = self.sinks.slack.as_mut() {
            slack.token = secrets.slack();
        }
        if let Some(slack) = self.notifications.slack.as_mut() {
            slack.token = secrets.slack();
        }
    }
}

/// Config path from the flag, `DEPUTIZE_CONFIG`, or the default.
pub fn resolve_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
