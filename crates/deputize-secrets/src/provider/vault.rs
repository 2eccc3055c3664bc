//! `HashiCorp` Vault KV v2 secret provider.
//!
//! All deputize credentials live as keys of one KV v2 secret. The secret is
//! read once and served from memory afterwards.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use zeroize::Zeroize;

use crate::config::VaultConfig;
use crate::provider::file::secret_from_document;
use crate::{SecretError, SecretProvider, SecretValue};

/// Secret provider that reads one Vault KV v2 secret.
pub struct VaultSecretProvider {
    client: reqwest::Client,
    address: String,
    mount: String,
    path: String,
    namespace: Option<String>,
    token: String,
    document: OnceCell<Map<String, Value>>,
}

impl std::fmt::Debug for VaultSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSecretProvider")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("path", &self.path)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl Drop for VaultSecretProvider {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

impl VaultSecretProvider {
    /// Create a provider, resolving the Vault token up front.
    ///
    /// The token comes from `token`, then `token_file`, then `VAULT_TOKEN`.
    pub fn new(config: &VaultConfig) -> Result<Self, SecretError> {
        let token = resolve_token(config)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SecretError::ConfigError {
                detail: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            address: config.address.trim_end_matches('/').to_string(),
            mount: config.mount.trim_matches('/').to_string(),
            path: config.path.trim_matches('/').to_string(),
            namespace: config.namespace.clone(),
            token,
            document: OnceCell::new(),
        })
    }

    fn secret_url(&self) -> String {
        format!("{}/v1/{}/data/{}", self.address, self.mount, self.path)
    }

    async fn fetch_document(&self) -> Result<Map<String, Value>, SecretError> {
        let mut req = self
            .client
            .get(self.secret_url())
            .header("X-Vault-Token", &self.token);
        if let Some(ns) = &self.namespace {
            req = req.header("X-Vault-Namespace", ns);
        }

        let resp = req.send().await.map_err(|e| {
            SecretError::unavailable("vault", format!("Failed to read '{}': {e}", self.path))
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SecretError::unavailable(
                "vault",
                format!("no secret at {}/{}", self.mount, self.path),
            ));
        }
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(SecretError::unavailable(
                "vault",
                format!("Vault returned HTTP {status} for '{}': {body_text}", self.path),
            ));
        }

        let json: Value = resp.json().await.map_err(|e| {
            SecretError::unavailable("vault", format!("Invalid Vault response JSON: {e}"))
        })?;

        let version = json
            .pointer("/data/metadata/version")
            .and_then(Value::as_u64);

        // KV v2 keeps the payload under data.data
        match json.pointer("/data/data") {
            Some(Value::Object(data)) => {
                tracing::info!(
                    path = %format!("{}/{}", self.mount, self.path),
                    version = ?version,
                    keys = data.len(),
                    "Secrets loaded from Vault"
                );
                Ok(data.clone())
            }
            _ => Err(SecretError::unavailable(
                "vault",
                "Missing data.data in Vault KV v2 response",
            )),
        }
    }
}

fn resolve_token(config: &VaultConfig) -> Result<String, SecretError> {
    if let Some(token) = config.token.as_ref().filter(|t| !t.trim().is_empty()) {
        return Ok(token.trim().to_string());
    }
    if let Some(path) = &config.token_file {
        return read_token_file(path);
    }
    match std::env::var("VAULT_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(SecretError::ConfigError {
            detail: "vault token_file isn't set and no VAULT_TOKEN env present".to_string(),
        }),
    }
}

fn read_token_file(path: &Path) -> Result<String, SecretError> {
    let mut contents = std::fs::read_to_string(path).map_err(|e| SecretError::ConfigError {
        detail: format!("Unable to read Vault token file '{}': {e}", path.display()),
    })?;
    let token = contents.trim().to_string();
    contents.zeroize();
    if token.is_empty() {
        return Err(SecretError::ConfigError {
            detail: format!("Vault token file '{}' is empty", path.display()),
        });
    }
    Ok(token)
}

#[async_trait]
impl SecretProvider for VaultSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let document = self
            .document
            .get_or_try_init(|| self.fetch_document())
            .await?;
        secret_from_document(document, name)
    }

    async fn health_check(&self) -> Result<bool, SecretError> {
        let url = format!("{}/v1/sys/health", self.address);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SecretError::unavailable("vault", format!("Vault health check failed: {e}")))?;

        // 429 standby, 472 DR secondary, 473 performance standby
        match resp.status().as_u16() {
            200 | 429 | 472 | 473 => Ok(true),
            _ => Ok(false),
        }
    }

    fn provider_type(&self) -> &'static str {
        "vault"
    }
}
