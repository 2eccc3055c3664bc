//! Shared HTTP client for the REST adapters.

use std::time::Duration;

use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use deputize_core::error::{SinkError, SinkResult};

/// How the API token is presented.
#[derive(Clone)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// `PRIVATE-TOKEN: <token>` (Gitlab personal/project tokens).
    PrivateToken(String),
    /// `Authorization: Token token=<token>` (PagerDuty REST API keys).
    TokenToken(String),
}

impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self {
            AuthScheme::Bearer(_) => "Bearer",
            AuthScheme::PrivateToken(_) => "PrivateToken",
            AuthScheme::TokenToken(_) => "TokenToken",
        };
        write!(f, "{scheme}(***REDACTED***)")
    }
}

impl AuthScheme {
    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            AuthScheme::Bearer(token) => builder.bearer_auth(token),
            AuthScheme::PrivateToken(token) => builder.header("PRIVATE-TOKEN", token),
            AuthScheme::TokenToken(token) => {
                builder.header(header::AUTHORIZATION, format!("Token token={token}"))
            }
        }
    }
}

/// Thin wrapper around `reqwest` for one API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    auth: AuthScheme,
    timeout: Duration,
    service: &'static str,
    accept: Option<&'static str>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ApiClient {
    /// Create a client for `base_url`.
    ///
    /// A trailing slash is added to the base URL so relative paths join
    /// beneath it.
    pub fn new(
        service: &'static str,
        base_url: &str,
        auth: AuthScheme,
        timeout: Duration,
    ) -> SinkResult<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            SinkError::invalid_config(format!("{service}: invalid base URL {base_url}: {e}"))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("deputize/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SinkError::invalid_config(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url,
            auth,
            timeout,
            service,
            accept: None,
        })
    }

    /// Send `Accept: <value>` on every request.
    #[must_use]
    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.accept = Some(accept);
        self
    }

    /// Resolve an API path against the base URL.
    pub fn url(&self, path: &str) -> SinkResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SinkError::invalid_config(format!("{}: invalid path {path}: {e}", self.service)))
    }

    /// Build an authenticated request.
    pub fn request(&self, method: Method, path: &str) -> SinkResult<RequestBuilder> {
        let url = self.url(path)?;
        let mut builder = self.client.request(method, url);
        if let Some(accept) = self.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        Ok(self.auth.apply(builder))
    }

    /// Send a request and fail on any non-success status.
    pub async fn send(&self, builder: RequestBuilder, operation: &str) -> SinkResult<Response> {
        let response = self.send_raw(builder, operation).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.handle_response_error(status, &body, operation))
    }

    /// Send a request and return the response whatever its status.
    pub async fn send_raw(&self, builder: RequestBuilder, operation: &str) -> SinkResult<Response> {
        let response = builder.send().await.map_err(|e| self.map_transport_error(e, operation))?;
        debug!(service = self.service, operation, status = %response.status(), "HTTP response");
        Ok(response)
    }

    /// Decode a JSON body.
    pub async fn json<T: DeserializeOwned>(&self, response: Response, operation: &str) -> SinkResult<T> {
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e, operation))?;
        trace!(service = self.service, operation, body = %body, "HTTP response body");
        serde_json::from_str(&body).map_err(|e| {
            SinkError::invalid_data(format!("{}: {operation}: unexpected response: {e}", self.service))
        })
    }

    /// GET `path` with query parameters and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        operation: &str,
    ) -> SinkResult<T> {
        let builder = self.request(Method::GET, path)?.query(query);
        let response = self.send(builder, operation).await?;
        self.json(response, operation).await
    }

    fn map_transport_error(&self, e: reqwest::Error, operation: &str) -> SinkError {
        if e.is_timeout() {
            SinkError::timeout(format!("{} {operation}", self.service), self.timeout)
        } else if e.is_connect() {
            SinkError::connection_failed_with_source(
                format!("{}: could not reach {}", self.service, self.base_url),
                e,
            )
        } else {
            SinkError::operation_failed_with_source(format!("{}: {operation} failed", self.service), e)
        }
    }

    /// Map an error status onto a sink error.
    pub fn handle_response_error(&self, status: StatusCode, body: &str, operation: &str) -> SinkError {
        let error_message = error_message(body);

        match status {
            StatusCode::UNAUTHORIZED => SinkError::AuthenticationFailed {
                message: format!("{}: {error_message}", self.service),
            },
            StatusCode::FORBIDDEN => SinkError::AuthorizationFailed {
                operation: format!("{} {operation}", self.service),
            },
            StatusCode::NOT_FOUND => SinkError::NotFound {
                identifier: format!("{} {operation}", self.service),
            },
            StatusCode::TOO_MANY_REQUESTS => SinkError::Unavailable {
                message: format!("{}: rate limited: {error_message}", self.service),
            },
            s if s.is_server_error() => SinkError::Unavailable {
                message: format!("{}: HTTP {status}: {error_message}", self.service),
            },
            _ => SinkError::Api {
                status: status.as_u16(),
                message: format!("{}: {operation}: {error_message}", self.service),
            },
        }
    }
}

/// Pull a readable message out of an error body.
fn error_message(body: &str) -> String {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    for key in ["message", "error"] {
        match json.get(key) {
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Object(obj)) => {
                if let Some(Value::String(s)) = obj.get("message") {
                    return s.clone();
                }
            }
            Some(other) if !other.is_null() => return other.to_string(),
            _ => {}
        }
    }
    body.trim().to_string()
}
