//! Environment variable secret provider.
//!
//! Logical names map to `DEPUTIZE_*` variables unless the `secrets.env`
//! table names a different variable.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{SecretError, SecretProvider, SecretValue};
use crate::{GITLAB_TOKEN, LDAP_PASSWORD, PAGERDUTY_TOKEN, SLACK_TOKEN};

/// Secret provider that reads secrets from environment variables.
#[derive(Debug)]
pub struct EnvSecretProvider {
    /// Logical name to environment variable name overrides.
    mappings: HashMap<String, String>,
}

impl EnvSecretProvider {
    /// Create a provider with the given overrides.
    #[must_use]
    pub fn new(mappings: HashMap<String, String>) -> Self {
        Self { mappings }
    }

    /// Environment variable holding a logical secret.
    fn env_var_name(&self, logical_name: &str) -> String {
        if let Some(mapped) = self.mappings.get(logical_name) {
            return mapped.clone();
        }
        match logical_name {
            PAGERDUTY_TOKEN => "DEPUTIZE_PAGERDUTY_TOKEN".to_string(),
            GITLAB_TOKEN => "DEPUTIZE_GITLAB_TOKEN".to_string(),
            LDAP_PASSWORD => "DEPUTIZE_LDAP_PASSWORD".to_string(),
            SLACK_TOKEN => "DEPUTIZE_SLACK_TOKEN".to_string(),
            other => other.to_uppercase(),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let env_var = self.env_var_name(name);

        match std::env::var(&env_var) {
            Ok(value) if !value.is_empty() => {
                tracing::debug!(
                    secret_name = name,
                    env_var = %env_var,
                    "Secret loaded from environment variable"
                );
                Ok(SecretValue::new(name, value))
            }
            // Empty counts as unset
            _ => Err(SecretError::not_found(name)),
        }
    }

    async fn health_check(&self) -> Result<bool, SecretError> {
        Ok(true)
    }

    fn provider_type(&self) -> &'static str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_env_provider_explicit_mapping() {
        std::env::set_var("DEPUTIZE_TEST_SLACK_A", "xoxb-from-env");
        let provider = EnvSecretProvider::new(HashMap::from([(
            SLACK_TOKEN.to_string(),
            "DEPUTIZE_TEST_SLACK_A".to_string(),
        )]));
        let sv = provider.get_secret(SLACK_TOKEN).await.unwrap();
        assert_eq!(sv.expose(), "xoxb-from-env");
        assert_eq!(sv.name, SLACK_TOKEN);
        std::env::remove_var("DEPUTIZE_TEST_SLACK_A");
    }

    #[tokio::test]
    async fn test_env_provider_missing_and_empty() {
        std::env::set_var("DEPUTIZE_TEST_EMPTY_B", "");
        let provider = EnvSecretProvider::new(HashMap::from([
            ("empty".to_string(), "DEPUTIZE_TEST_EMPTY_B".to_string()),
            ("absent".to_string(), "DEPUTIZE_TEST_ABSENT_B".to_string()),
        ]));
        for name in ["empty", "absent"] {
            match provider.get_secret(name).await.unwrap_err() {
                SecretError::NotFound { name: missing } => assert_eq!(missing, name),
                other => panic!("Expected NotFound, got: {other}"),
            }
        }
        std::env::remove_var("DEPUTIZE_TEST_EMPTY_B");
    }

    #[test]
    fn test_default_variable_names() {
        let provider = EnvSecretProvider::new(HashMap::new());
        assert_eq!(provider.env_var_name(PAGERDUTY_TOKEN), "DEPUTIZE_PAGERDUTY_TOKEN");
        assert_eq!(provider.env_var_name(LDAP_PASSWORD), "DEPUTIZE_LDAP_PASSWORD");
        assert_eq!(provider.env_var_name("custom"), "CUSTOM");
    }
}
