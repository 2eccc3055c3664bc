//! Secret provider configuration (the `secrets` section of the config file).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Backend that secrets are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Environment variables.
    #[default]
    Env,
    /// A JSON object in a local file.
    File,
    /// `HashiCorp` Vault KV v2.
    Vault,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Env => write!(f, "env"),
            ProviderType::File => write!(f, "file"),
            ProviderType::Vault => write!(f, "vault"),
        }
    }
}

/// JSON file provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// File holding a JSON object of secret name to value.
    pub path: PathBuf,
}

/// Vault provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault server address, e.g. `https://vault.example.com:8200`.
    pub address: String,

    /// KV v2 mount.
    #[serde(default = "default_mount")]
    pub mount: String,

    /// Secret path under the mount.
    #[serde(default = "default_path")]
    pub path: String,

    /// File holding the Vault token. Falls back to `VAULT_TOKEN` when unset.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Explicit token. Prefer `token_file` or `VAULT_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,

    /// Vault Enterprise namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    /// HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("path", &self.path)
            .field("token_file", &self.token_file)
            .field("token", &self.token.as_ref().map(|_| "***REDACTED***"))
            .field("namespace", &self.namespace)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_mount() -> String {
    "secret".to_string()
}

fn default_path() -> String {
    "deputize".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl VaultConfig {
    /// Create a config for `address` with the default mount and path.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            mount: default_mount(),
            path: default_path(),
            token_file: None,
            token: None,
            namespace: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// The `secrets` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Which backend to read from.
    #[serde(default)]
    pub provider: ProviderType,

    /// Env provider: logical secret name to environment variable name.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// File provider settings.
    #[serde(default)]
    pub file: Option<FileConfig>,

    /// Vault provider settings.
    #[serde(default)]
    pub vault: Option<VaultConfig>,
}

impl SecretsConfig {
    /// Every problem with the configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self.provider {
            ProviderType::Env => {}
            ProviderType::File => {
                if self.file.is_none() {
                    problems.push("file provider selected but secrets.file is missing".to_string());
                }
            }
            ProviderType::Vault => match &self.vault {
                None => {
                    problems.push("vault provider selected but secrets.vault is missing".to_string())
                }
                Some(vault) => {
                    if vault.address.trim().is_empty() {
                        problems.push("vault address not configured".to_string());
                    }
                    if vault.path.trim().is_empty() {
                        problems.push("vault path not configured".to_string());
                    }
                }
            },
        }
        problems
    }
}
