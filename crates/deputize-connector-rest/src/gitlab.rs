//! Gitlab group sink
//!
//! Keeps the membership of a Gitlab group (typically a merge request
//! approver group) in line with an on-call roster. Members at or above the
//! protected access level are never removed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use deputize_core::error::{SinkError, SinkResult};
use deputize_core::identity::{IdentitySet, ResolvedIdentity, RosterEntry};
use deputize_core::mutation::{apply_member_plan, MutationResult};
use deputize_core::snapshot::MembershipSnapshot;
use deputize_core::traits::{IdentityResolver, MemberOp, Sink, SinkMutator, SnapshotReader};
use deputize_core::types::{SinkHandle, SinkKind, SinkPolicy};
use deputize_core::MutationPlan;

use crate::client::{ApiClient, AuthScheme};

const MAX_PAGES: u32 = 1000;

/// Gitlab sink configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct GitlabConfig {
    /// Whether the sink takes part in a pass.
    #[serde(default)]
    pub enabled: bool,

    /// Gitlab base URL (e.g., "https://gitlab.example.com/").
    #[serde(default)]
    pub server: String,

    /// Group path or numeric ID.
    #[serde(default)]
    pub group: String,

    /// Schedules whose on-call users become group members. Falls back to
    /// the pass-wide schedules when empty.
    #[serde(default)]
    pub approver_schedules: Vec<String>,

    /// Access level granted to new members (30 = Developer).
    #[serde(default = "default_access_level")]
    pub access_level: u32,

    /// Members at or above this level are never removed (40 = Maintainer).
    #[serde(default = "default_protected_access_level")]
    pub protected_access_level: u32,

    /// Leave the group untouched when nobody on call resolved.
    #[serde(default = "default_skip_when_empty")]
    pub skip_when_empty: bool,

    /// Continue when an on-call email has no Gitlab account.
    #[serde(default = "default_skip_unresolved")]
    pub skip_unresolved: bool,

    /// Page size for member listing.
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API token, filled in from the secret bundle.
    #[serde(skip)]
    pub token: Option<String>,
}

impl std::fmt::Debug for GitlabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitlabConfig")
            .field("enabled", &self.enabled)
            .field("server", &self.server)
            .field("group", &self.group)
            .field("approver_schedules", &self.approver_schedules)
            .field("access_level", &self.access_level)
            .field("protected_access_level", &self.protected_access_level)
            .field("skip_when_empty", &self.skip_when_empty)
            .field("skip_unresolved", &self.skip_unresolved)
            .field("per_page", &self.per_page)
            .field("timeout_secs", &self.timeout_secs)
            .field("token", &self.token.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

fn default_access_level() -> u32 {
    30
}

fn default_protected_access_level() -> u32 {
    40
}

fn default_skip_when_empty() -> bool {
    true
}

fn default_skip_unresolved() -> bool {
    true
}

fn default_per_page() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: String::new(),
            group: String::new(),
            approver_schedules: Vec::new(),
            access_level: default_access_level(),
            protected_access_level: default_protected_access_level(),
            skip_when_empty: default_skip_when_empty(),
            skip_unresolved: default_skip_unresolved(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            token: None,
        }
    }
}

impl GitlabConfig {
    /// Create a config for a server and group.
    pub fn new(server: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            enabled: true,
            server: server.into(),
            group: group.into(),
            ..Self::default()
        }
    }

    /// Set the API token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// API root under the server URL.
    #[must_use]
    pub fn api_url(&self) -> String {
        format!("{}/api/v4/", self.server.trim_end_matches('/'))
    }

    /// Policy handed to the reconciler.
    #[must_use]
    pub fn policy(&self) -> SinkPolicy {
        SinkPolicy {
            skip_unresolved: self.skip_unresolved,
            skip_when_empty: self.skip_when_empty,
        }
    }

    /// Every problem with the configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.server.trim().is_empty() {
            problems.push("server not configured".to_string());
        }
        if self.group.trim().is_empty() {
            problems.push("group not configured".to_string());
        }
        if self.access_level >= self.protected_access_level {
            problems.push(format!(
                "access_level {} must be below protected_access_level {}",
                self.access_level, self.protected_access_level
            ));
        }
        if self.per_page == 0 || self.per_page > 100 {
            problems.push("per_page must be between 1 and 100".to_string());
        }
        problems
    }
}

#[derive(Debug, Deserialize)]
struct GitlabUser {
    id: u64,
    username: String,
}

#[derive(Debug, Deserialize)]
struct GitlabMember {
    id: u64,
    username: String,
    access_level: u32,
}

#[derive(Debug, Serialize)]
struct AddMemberRequest {
    user_id: u64,
    access_level: u32,
}

/// Sink for a Gitlab group.
#[derive(Debug)]
pub struct GitlabSink {
    config: GitlabConfig,
    name: String,
    client: ApiClient,
}

impl GitlabSink {
    /// Create a new Gitlab sink.
    pub fn new(config: GitlabConfig) -> SinkResult<Self> {
        let problems = config.problems();
        if !problems.is_empty() {
            return Err(SinkError::invalid_config(problems.join(", ")));
        }
        let token = config
            .token
            .clone()
            .ok_or_else(|| SinkError::invalid_config("gitlab token not provided"))?;

        let client = ApiClient::new(
            "gitlab",
            &config.api_url(),
            AuthScheme::PrivateToken(token),
            Duration::from_secs(config.timeout_secs),
        )?;

        Ok(Self {
            name: "gitlab".to_string(),
            config,
            client,
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &GitlabConfig {
        &self.config
    }

    fn members_path(&self) -> String {
        format!("groups/{}/members", encode_path_segment(&self.config.group))
    }

    fn member_id(member: &ResolvedIdentity) -> SinkResult<u64> {
        member.value().parse().map_err(|_| {
            SinkError::invalid_data(format!("not a Gitlab user ID: {}", member.value()))
        })
    }
}

/// Percent-encode a group path for use as one URL path segment.
fn encode_path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

impl Sink for GitlabSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Gitlab
    }

    fn policy(&self) -> SinkPolicy {
        self.config.policy()
    }
}

#[async_trait]
impl IdentityResolver for GitlabSink {
    #[instrument(skip(self), fields(sink = %self.name))]
    async fn lookup(&self, entry: &RosterEntry) -> SinkResult<Vec<ResolvedIdentity>> {
        let users: Vec<GitlabUser> = self
            .client
            .get_json("users", &[("search", entry.as_str())], "list users")
            .await?;

        for user in &users {
            debug!(email = %entry, username = %user.username, id = user.id, "Gitlab user matched");
        }

        Ok(users
            .into_iter()
            .map(|user| ResolvedIdentity::new(user.id.to_string()).with_label(user.username))
            .collect())
    }
}

#[async_trait]
impl SnapshotReader for GitlabSink {
    #[instrument(skip(self), fields(sink = %self.name, group = %self.config.group))]
    async fn read_snapshot(&self) -> SinkResult<MembershipSnapshot> {
        let path = self.members_path();
        let per_page = self.config.per_page.to_string();
        let mut members = IdentitySet::new();
        let mut protected = IdentitySet::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let builder = self
                .client
                .request(Method::GET, &path)?
                .query(&[("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            let response = self.client.send(builder, "list group members").await?;

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());

            let batch: Vec<GitlabMember> = self.client.json(response, "list group members").await?;
            debug!(page, count = batch.len(), "Read Gitlab member page");

            for member in batch {
                let identity =
                    ResolvedIdentity::new(member.id.to_string()).with_label(member.username);
                if member.access_level >= self.config.protected_access_level {
                    protected.insert(identity.clone());
                }
                members.insert(identity);
            }

            match next_page {
                Some(next) if next > page && next <= MAX_PAGES => page = next,
                _ => break,
            }
        }

        info!(
            members = members.len(),
            protected = protected.len(),
            "Read Gitlab group members"
        );

        Ok(MembershipSnapshot::new(SinkHandle::new(self.config.group.clone()), members)
            .with_protected(protected))
    }
}

#[async_trait]
impl MemberOp for GitlabSink {
    #[instrument(skip(self, handle), fields(group = %handle.target))]
    async fn add_member(&self, handle: &SinkHandle, member: &ResolvedIdentity) -> SinkResult<()> {
        let request = AddMemberRequest {
            user_id: Self::member_id(member)?,
            access_level: self.config.access_level,
        };
        let builder = self
            .client
            .request(Method::POST, &self.members_path())?
            .json(&request);
        let response = self.client.send_raw(builder, "add group member").await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.client.handle_response_error(status, &body, "add group member"))
    }

    #[instrument(skip(self, handle), fields(group = %handle.target))]
    async fn remove_member(
        &self,
        handle: &SinkHandle,
        member: &ResolvedIdentity,
    ) -> SinkResult<()> {
        let path = format!("{}/{}", self.members_path(), Self::member_id(member)?);
        let builder = self.client.request(Method::DELETE, &path)?;
        let response = self.client.send_raw(builder, "remove group member").await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.client.handle_response_error(status, &body, "remove group member"))
    }
}

#[async_trait]
impl SinkMutator for GitlabSink {
    async fn apply(
        &self,
        snapshot: &MembershipSnapshot,
        plan: &MutationPlan,
        call_timeout: Duration,
    ) -> MutationResult {
        apply_member_plan(self, &snapshot.handle, plan, call_timeout).await
    }
}
