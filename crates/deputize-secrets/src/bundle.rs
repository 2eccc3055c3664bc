//! The set of credentials a pass needs, loaded and validated together.

use crate::{SecretError, SecretProvider, SecretValue};
use crate::{GITLAB_TOKEN, LDAP_PASSWORD, PAGERDUTY_TOKEN, SLACK_TOKEN};

/// Which credentials the enabled source and sinks need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretRequirements {
    pub pagerduty: bool,
    pub gitlab: bool,
    pub ldap: bool,
    pub slack: bool,
}

/// Credentials for one pass. Only the required ones are loaded.
#[derive(Debug, Default)]
pub struct SecretBundle {
    pub pagerduty_token: Option<SecretValue>,
    pub gitlab_token: Option<SecretValue>,
    pub ldap_password: Option<SecretValue>,
    pub slack_token: Option<SecretValue>,
}

/// Join problems as `1. first, 2. second`.
#[must_use]
pub fn numbered(problems: &[String]) -> String {
    problems
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {p}", i + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SecretBundle {
    /// Load every required credential.
    ///
    /// Missing or empty credentials are collected and reported together as
    /// one [`SecretError::Missing`]. Provider failures other than a missing
    /// secret are returned as soon as they occur.
    pub async fn load(
        provider: &dyn SecretProvider,
        requirements: &SecretRequirements,
    ) -> Result<Self, SecretError> {
        let wanted = [
            (requirements.pagerduty, PAGERDUTY_TOKEN, "PagerDuty source"),
            (requirements.gitlab, GITLAB_TOKEN, "Gitlab sink"),
            (requirements.ldap, LDAP_PASSWORD, "LDAP sink"),
            (requirements.slack, SLACK_TOKEN, "Slack sink"),
        ];

        let mut bundle = SecretBundle::default();
        let mut problems = Vec::new();

        for (required, name, owner) in wanted {
            if !required {
                continue;
            }
            match provider.get_secret(name).await {
                Ok(secret) if !secret.is_blank() => *bundle.slot(name) = Some(secret),
                Ok(_) | Err(SecretError::NotFound { .. }) => problems.push(format!(
                    "{owner} is enabled, but there's an empty or nonexistent {name} value in the {} secret provider",
                    provider.provider_type()
                )),
                Err(e) => return Err(e),
            }
        }

        if !problems.is_empty() {
            return Err(SecretError::Missing {
                problems: numbered(&problems),
            });
        }

        tracing::debug!(
            provider = provider.provider_type(),
            pagerduty = bundle.pagerduty_token.is_some(),
            gitlab = bundle.gitlab_token.is_some(),
            ldap = bundle.ldap_password.is_some(),
            slack = bundle.slack_token.is_some(),
            "Secrets loaded"
        );
        Ok(bundle)
    }

    fn slot(&mut self, name: &str) -> &mut Option<SecretValue> {
        match name {
            PAGERDUTY_TOKEN => &mut self.pagerduty_token,
            GITLAB_TOKEN => &mut self.gitlab_token,
            LDAP_PASSWORD => &mut self.ldap_password,
            _ => &mut self.slack_token,
        }
    }

    /// PagerDuty token text, when loaded.
    #[must_use]
    pub fn pagerduty(&self) -> Option<String> {
        self.pagerduty_token.as_ref().map(|s| s.expose().to_string())
    }

    /// Gitlab token text, when loaded.
    #[must_use]
    pub fn gitlab(&self) -> Option<String> {
        self.gitlab_token.as_ref().map(|s| s.expose().to_string())
    }

    /// LDAP bind password text, when loaded.
    #[must_use]
    pub fn ldap(&self) -> Option<String> {
        self.ldap_password.as_ref().map(|s| s.expose().to_string())
    }

    /// Slack token text, when loaded.
    #[must_use]
    pub fn slack(&self) -> Option<String> {
        self.slack_token.as_ref().map(|s| s.expose().to_string())
    }
}
