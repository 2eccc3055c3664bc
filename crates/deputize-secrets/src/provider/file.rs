//! JSON file secret provider.
//!
//! The file holds one JSON object whose keys are logical secret names:
//!
//! ```json
//! {"PDAuthToken": "...", "SlackAuthToken": "xoxb-..."}
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::FileConfig;
use crate::{SecretError, SecretProvider, SecretValue};

/// Secret provider that reads a JSON document from disk.
#[derive(Debug)]
pub struct FileSecretProvider {
    path: PathBuf,
}

impl FileSecretProvider {
    /// Create a provider for the configured file.
    pub fn new(config: &FileConfig) -> Result<Self, SecretError> {
        if config.path.as_os_str().is_empty() {
            return Err(SecretError::ConfigError {
                detail: "secrets.file.path is empty".to_string(),
            });
        }
        Ok(Self {
            path: config.path.clone(),
        })
    }

    #[cfg(unix)]
    fn check_permissions(metadata: &std::fs::Metadata, path: &std::path::Path) {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = %format!("{:o}", mode & 0o777),
                "Secret file is readable by group or others"
            );
        }
    }

    #[cfg(not(unix))]
    fn check_permissions(_metadata: &std::fs::Metadata, _path: &std::path::Path) {}

    async fn read_document(&self) -> Result<Map<String, Value>, SecretError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::PermissionDenied => SecretError::PermissionDenied {
                    detail: format!(
                        "Cannot read secret file '{}': permission denied",
                        self.path.display()
                    ),
                },
                _ => SecretError::unavailable(
                    "file",
                    format!("Failed to read '{}': {e}", self.path.display()),
                ),
            })?;

        if let Ok(metadata) = tokio::fs::metadata(&self.path).await {
            Self::check_permissions(&metadata, &self.path);
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(SecretError::ConfigError {
                detail: format!("'{}' must contain a JSON object", self.path.display()),
            }),
            Err(e) => Err(SecretError::ConfigError {
                detail: format!("'{}' is not valid JSON: {e}", self.path.display()),
            }),
        }
    }
}

/// Pull one string secret out of a decoded document.
pub(crate) fn secret_from_document(
    document: &Map<String, Value>,
    name: &str,
) -> Result<SecretValue, SecretError> {
    match document.get(name) {
        None | Some(Value::Null) => Err(SecretError::not_found(name)),
        Some(Value::String(s)) if s.is_empty() => Err(SecretError::not_found(name)),
        Some(Value::String(s)) => Ok(SecretValue::new(name, s.as_str())),
        Some(_) => Err(SecretError::InvalidValue {
            name: name.to_string(),
            detail: "expected a string".to_string(),
        }),
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<SecretValue, SecretError> {
        let document = self.read_document().await?;
        let secret = secret_from_document(&document, name)?;

        tracing::debug!(
            secret_name = name,
            path = %self.path.display(),
            "Secret loaded from file"
        );
        Ok(secret)
    }

    async fn health_check(&self) -> Result<bool, SecretError> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Secret file does not exist");
            return Ok(false);
        }
        Ok(self.read_document().await.is_ok())
    }

    fn provider_type(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn provider_for(contents: &str) -> (tempfile::NamedTempFile, FileSecretProvider) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let provider = FileSecretProvider::new(&FileConfig {
            path: file.path().to_path_buf(),
        })
        .unwrap();
        (file, provider)
    }

    #[tokio::test]
    async fn test_file_provider_reads_named_secret() {
        let (_file, provider) =
            provider_for(r#"{"PDAuthToken": "pd-123", "SlackAuthToken": "xoxb-1"}"#);
        let sv = provider.get_secret("PDAuthToken").await.unwrap();
        assert_eq!(sv.expose(), "pd-123");
        assert!(provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_provider_missing_and_empty_are_not_found() {
        let (_file, provider) = provider_for(r#"{"GitlabAuthToken": ""}"#);
        assert!(matches!(
            provider.get_secret("GitlabAuthToken").await.unwrap_err(),
            SecretError::NotFound { .. }
        ));
        assert!(matches!(
            provider.get_secret("SlackAuthToken").await.unwrap_err(),
            SecretError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_file_provider_rejects_non_string() {
        let (_file, provider) = provider_for(r#"{"PDAuthToken": 42}"#);
        assert!(matches!(
            provider.get_secret("PDAuthToken").await.unwrap_err(),
            SecretError::InvalidValue { .. }
        ));
    }

    #[tokio::test]
    async fn test_file_provider_rejects_non_object() {
        let (_file, provider) = provider_for(r#"["PDAuthToken"]"#);
        assert!(matches!(
            provider.get_secret("PDAuthToken").await.unwrap_err(),
            SecretError::ConfigError { .. }
        ));
        assert!(!provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_provider_missing_file() {
        let provider = FileSecretProvider::new(&FileConfig {
            path: PathBuf::from("/nonexistent/deputize/secrets.json"),
        })
        .unwrap();
        assert!(!provider.health_check().await.unwrap());
        assert!(provider.get_secret("PDAuthToken").await.is_err());
    }
}
