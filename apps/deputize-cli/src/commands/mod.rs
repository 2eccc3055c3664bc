//! CLI command implementations

pub mod check_config;
pub mod oncall;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use deputize_connector_ldap::LdapSink;
use deputize_connector_rest::{
    GitlabSink, PagerDutySource, SlackApi, SlackNotifier, SlackTopicSink,
    DEFAULT_SLACK_API_URL,
};
use deputize_core::traits::Sink;
use deputize_secrets::{build_provider, SecretBundle};

use crate::config::{resolve_path, DeputizeConfig};
use crate::error::{CliError, CliResult};
use crate::logging::init_logging;

/// Config file selection shared by commands that read it.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the JSON config file
    #[arg(short, long, env = "DEPUTIZE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Load, log and validate the config, then fill in credentials.
pub async fn prepare(args: &ConfigArgs) -> CliResult<DeputizeConfig> {
    let path = resolve_path(args.config.clone());
    let mut config = DeputizeConfig::load(&path)?;
    init_logging(&config.logging);
    tracing::debug!(path = %path.display(), "Loaded configuration");

    config.validate()?;

    let provider = build_provider(&config.secrets)?;
    if !provider.health_check().await.unwrap_or(false) {
        tracing::warn!(provider = provider.provider_type(), "Secret provider reports unhealthy");
    }
    let bundle = SecretBundle::load(provider.as_ref(), &config.secret_requirements()).await?;
    config.apply_secrets(&bundle);

    Ok(config)
}

/// Every adapter the config enables, constructed but not yet contacted.
pub struct Adapters {
    pub source: PagerDutySource,
    pub ldap: Option<Arc<LdapSink>>,
    pub gitlab: Option<Arc<GitlabSink>>,
    pub slack: Vec<Arc<SlackTopicSink>>,
    pub notifier: Option<Arc<SlackNotifier>>,
}

impl Adapters {
    /// Construct every enabled adapter from a config with credentials applied.
    pub fn build(config: &DeputizeConfig) -> CliResult<Self> {
        let source = PagerDutySource::new(&config.source.pagerduty)?;

        let ldap = config
            .ldap()
            .map(|c| LdapSink::new(c.clone()).map(Arc::new))
            .transpose()?;

        let gitlab = config
            .gitlab()
            .map(|c| GitlabSink::new(c.clone()).map(Arc::new))
            .transpose()?;

        let slack = match config.slack() {
            Some(c) => c.sinks()?.into_iter().map(Arc::new).collect(),
            None => Vec::new(),
        };

        let channels = config.notification_channels();
        let notifier = if channels.is_empty() {
            None
        } else {
            let token = config
                .notifications
                .slack
                .as_ref()
                .and_then(|n| n.token.clone())
                .ok_or_else(|| CliError::Config("slack token not provided".to_string()))?;
            let api = match config.sinks.slack.as_ref() {
                Some(slack) => SlackApi::new(
                    &slack.api_url,
                    token,
                    Duration::from_secs(slack.timeout_secs),
                )?,
                None => SlackApi::new(DEFAULT_SLACK_API_URL, token, Duration::from_secs(10))?,
            };
            Some(Arc::new(SlackNotifier::new(api, channels)))
        };

        Ok(Self {
            source,
            ldap,
            gitlab,
            slack,
            notifier,
        })
    }

    /// Names of every sink, in reconcile order.
    pub fn sink_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(ldap) = &self.ldap {
            names.push(ldap.name().to_string());
        }
        if let Some(gitlab) = &self.gitlab {
            names.push(gitlab.name().to_string());
        }
        names.extend(self.slack.iter().map(|s| s.name().to_string()));
        names
    }
}
