//! LDAP sink implementation
//!
//! Resolves on-call emails to directory users and keeps the on-call group's
//! member attribute in line with the roster.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry,
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use deputize_core::error::{SinkError, SinkResult};
use deputize_core::identity::{identity_set, ResolvedIdentity, RosterEntry};
use deputize_core::mutation::{apply_member_plan, MutationResult};
use deputize_core::snapshot::MembershipSnapshot;
use deputize_core::traits::{IdentityResolver, MemberOp, Sink, SinkMutator, SnapshotReader};
use deputize_core::types::{SinkHandle, SinkKind, SinkPolicy};
use deputize_core::MutationPlan;

use crate::config::LdapSinkConfig;

const RC_SUCCESS: u32 = 0;
const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS: u32 = 50;

/// Sink for an LDAP on-call group.
pub struct LdapSink {
    /// Configuration.
    config: LdapSinkConfig,

    /// Sink name used in logs and reports.
    name: String,

    /// Cached, bound LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapSink {
    /// Create a new LDAP sink with the given configuration.
    pub fn new(config: LdapSinkConfig) -> SinkResult<Self> {
        config.validate()?;

        Ok(Self {
            config,
            name: "ldap".to_string(),
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Override the sink name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapSinkConfig {
        &self.config
    }

    /// Unbind and drop the cached connection.
    pub async fn close(&self) {
        let cached = self.connection.write().await.take();
        if let Some(mut ldap) = cached {
            if let Err(e) = ldap.unbind().await {
                debug!(error = %e, "LDAP unbind failed");
            }
        }
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> SinkResult<Ldap> {
        {
            let conn_guard = self.connection.read().await;
            if let Some(ref conn) = *conn_guard {
                return Ok(conn.clone());
            }
        }

        let conn = self.create_connection().await?;

        {
            let mut conn_guard = self.connection.write().await;
            *conn_guard = Some(conn.clone());
        }

        Ok(conn)
    }

    /// Connect, upgrade to TLS and bind as the configured service account.
    async fn create_connection(&self) -> SinkResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, starttls = self.config.use_starttls, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.timeout())
            .set_starttls(self.config.use_starttls)
            .set_no_tls_verify(self.config.insecure_skip_verify);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                SinkError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let bind_password = self.config.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap
            .with_timeout(self.config.timeout())
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| self.map_ldap_error("bind", e))?;

        if result.rc != RC_SUCCESS {
            if result.rc == RC_INVALID_CREDENTIALS {
                return Err(SinkError::AuthenticationFailed {
                    message: format!("invalid credentials for {bind_dn}"),
                });
            }
            return Err(SinkError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, bind_dn = %bind_dn, "LDAP connection established");

        Ok(ldap)
    }

    /// Subtree search under the base DN.
    async fn search(&self, filter: &str, attrs: Vec<&str>) -> SinkResult<Vec<SearchEntry>> {
        let mut ldap = self.get_connection().await?;

        debug!(filter = %filter, base_dn = %self.config.base_dn, "Searching LDAP");

        let (entries, _) = ldap
            .with_timeout(self.config.timeout())
            .search(&self.config.base_dn, Scope::Subtree, filter, attrs)
            .await
            .map_err(|e| self.map_ldap_error("search", e))?
            .success()
            .map_err(|e| SinkError::operation_failed_with_source("LDAP search failed", e))?;

        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    /// Single-value modify of the group's member attribute.
    async fn modify_member(
        &self,
        group_dn: &str,
        modification: Mod<String>,
    ) -> SinkResult<LdapResult> {
        let mut ldap = self.get_connection().await?;

        ldap.with_timeout(self.config.timeout())
            .modify(group_dn, vec![modification])
            .await
            .map_err(|e| self.map_ldap_error("modify", e))
    }

    /// The value stored in the group for a user entry.
    fn member_value(&self, entry: &SearchEntry) -> Vec<String> {
        if self.config.uses_dn_members() {
            return vec![entry.dn.clone()];
        }
        attribute_values(&entry.attrs, &self.config.user_attribute)
    }

    fn map_ldap_error(&self, operation: &str, e: LdapError) -> SinkError {
        match e {
            LdapError::Timeout { .. } => {
                SinkError::timeout(format!("LDAP {operation}"), self.config.timeout())
            }
            LdapError::Io { .. } | LdapError::EndOfStream => {
                SinkError::connection_failed_with_source(format!("LDAP {operation} failed"), e)
            }
            other => {
                SinkError::operation_failed_with_source(format!("LDAP {operation} failed"), other)
            }
        }
    }
}

/// Values of an attribute, matching the name case-insensitively.
fn attribute_values(attrs: &HashMap<String, Vec<String>>, name: &str) -> Vec<String> {
    attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.clone())
        .unwrap_or_default()
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

/// Interpret a member modify result.
///
/// Adding a value that is already present, or removing one that is gone, is
/// treated as success so a rerun converges.
fn check_modify_result(result: &LdapResult, group_dn: &str, operation: &str) -> SinkResult<()> {
    match result.rc {
        RC_SUCCESS => Ok(()),
        RC_ATTRIBUTE_OR_VALUE_EXISTS if operation == "add" => {
            debug!(group = %group_dn, "Member already present");
            Ok(())
        }
        RC_NO_SUCH_ATTRIBUTE if operation == "remove" => {
            debug!(group = %group_dn, "Member already absent");
            Ok(())
        }
        RC_NO_SUCH_OBJECT => Err(SinkError::NotFound {
            identifier: group_dn.to_string(),
        }),
        RC_INSUFFICIENT_ACCESS => Err(SinkError::AuthorizationFailed {
            operation: format!("{operation} member on {group_dn}"),
        }),
        rc => Err(SinkError::operation_failed(format!(
            "LDAP {operation} member failed with code {rc}: {}",
            result.text
        ))),
    }
}

impl Sink for LdapSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Ldap
    }

    fn policy(&self) -> SinkPolicy {
        self.config.policy()
    }
}

#[async_trait]
impl IdentityResolver for LdapSink {
    #[instrument(skip(self), fields(sink = %self.name))]
    async fn lookup(&self, entry: &RosterEntry) -> SinkResult<Vec<ResolvedIdentity>> {
        let filter = format!(
            "({}={})",
            self.config.mail_attribute,
            escape_filter_value(entry.as_str())
        );
        let entries = self
            .search(&filter, vec![self.config.user_attribute.as_str()])
            .await?;

        let mut candidates = Vec::with_capacity(entries.len());
        for user in &entries {
            let values = self.member_value(user);
            if values.is_empty() {
                warn!(
                    dn = %user.dn,
                    attribute = %self.config.user_attribute,
                    "Directory entry has no user attribute"
                );
            }
            candidates.extend(
                values
                    .into_iter()
                    .map(|value| ResolvedIdentity::new(value).with_label(user.dn.clone())),
            );
        }

        Ok(candidates)
    }
}

#[async_trait]
impl SnapshotReader for LdapSink {
    #[instrument(skip(self), fields(sink = %self.name))]
    async fn read_snapshot(&self) -> SinkResult<MembershipSnapshot> {
        let filter = self.config.group_search_filter();
        let mut groups = self
            .search(&filter, vec![self.config.member_attribute.as_str()])
            .await?;

        let group = match groups.len() {
            0 => {
                return Err(SinkError::NotFound {
                    identifier: filter,
                })
            }
            1 => groups.remove(0),
            n => {
                return Err(SinkError::invalid_data(format!(
                    "group filter {filter} matched {n} entries, expected exactly one"
                )))
            }
        };

        let members = identity_set(attribute_values(&group.attrs, &self.config.member_attribute));

        info!(group = %group.dn, members = members.len(), "Read LDAP on-call group");

        Ok(MembershipSnapshot::new(SinkHandle::new(group.dn), members))
    }
}

#[async_trait]
impl MemberOp for LdapSink {
    #[instrument(skip(self, handle), fields(group = %handle.target))]
    async fn add_member(&self, handle: &SinkHandle, member: &ResolvedIdentity) -> SinkResult<()> {
        let modification = Mod::Add(
            self.config.member_attribute.clone(),
            HashSet::from([member.value().to_string()]),
        );
        let result = self.modify_member(&handle.target, modification).await?;
        check_modify_result(&result, &handle.target, "add")
    }

    #[instrument(skip(self, handle), fields(group = %handle.target))]
    async fn remove_member(
        &self,
        handle: &SinkHandle,
        member: &ResolvedIdentity,
    ) -> SinkResult<()> {
        let modification = Mod::Delete(
            self.config.member_attribute.clone(),
            HashSet::from([member.value().to_string()]),
        );
        let result = self.modify_member(&handle.target, modification).await?;
        check_modify_result(&result, &handle.target, "remove")
    }
}

#[async_trait]
impl SinkMutator for LdapSink {
    async fn apply(
        &self,
        snapshot: &MembershipSnapshot,
        plan: &MutationPlan,
        call_timeout: Duration,
    ) -> MutationResult {
        apply_member_plan(self, &snapshot.handle, plan, call_timeout).await
    }
}

impl std::fmt::Debug for LdapSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSink")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ldap_result(rc: u32, text: &str) -> LdapResult {
        LdapResult {
            rc,
            matched: String::new(),
            text: text.to_string(),
            refs: Vec::new(),
            ctrls: Vec::new(),
        }
    }

    fn sink() -> LdapSink {
        LdapSink::new(
            LdapSinkConfig::new(
                "ldap.example.com",
                "dc=example,dc=com",
                "cn=deputize,dc=example,dc=com",
                "cn=oncall",
            )
            .with_password("secret"),
        )
        .unwrap()
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("alice@example.com"), "alice@example.com");
        assert_eq!(escape_filter_value("John*"), "John\\2a");
        assert_eq!(escape_filter_value("(admin)"), "\\28admin\\29");
        assert_eq!(escape_filter_value("a\\b"), "a\\5cb");
    }

    #[test]
    fn test_attribute_values_case_insensitive() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "memberUID".to_string(),
            vec!["alice".to_string(), "bob".to_string()],
        );
        assert_eq!(attribute_values(&attrs, "memberUid"), vec!["alice", "bob"]);
        assert!(attribute_values(&attrs, "member").is_empty());
    }

    #[test]
    fn test_member_value_uses_attribute_or_dn() {
        let mut attrs = HashMap::new();
        attrs.insert("uid".to_string(), vec!["alice".to_string()]);
        let entry = SearchEntry {
            dn: "uid=alice,ou=people,dc=example,dc=com".to_string(),
            attrs,
            bin_attrs: HashMap::new(),
        };

        let by_uid = sink();
        assert_eq!(by_uid.member_value(&entry), vec!["alice"]);

        let mut config = by_uid.config().clone();
        config.user_attribute = "dn".to_string();
        config.member_attribute = "member".to_string();
        let by_dn = LdapSink::new(config).unwrap();
        assert_eq!(
            by_dn.member_value(&entry),
            vec!["uid=alice,ou=people,dc=example,dc=com"]
        );
    }

    #[test]
    fn test_modify_result_success_and_idempotent_codes() {
        let dn = "cn=oncall,dc=example,dc=com";
        assert!(check_modify_result(&ldap_result(0, ""), dn, "add").is_ok());
        assert!(check_modify_result(&ldap_result(20, "exists"), dn, "add").is_ok());
        assert!(check_modify_result(&ldap_result(16, "no such"), dn, "remove").is_ok());
        assert!(check_modify_result(&ldap_result(16, "no such"), dn, "add").is_err());
    }

    #[test]
    fn test_modify_result_errors() {
        let dn = "cn=oncall,dc=example,dc=com";
        assert!(matches!(
            check_modify_result(&ldap_result(32, ""), dn, "add"),
            Err(SinkError::NotFound { .. })
        ));
        assert!(matches!(
            check_modify_result(&ldap_result(50, ""), dn, "remove"),
            Err(SinkError::AuthorizationFailed { .. })
        ));
        let err = check_modify_result(&ldap_result(53, "unwilling"), dn, "add").unwrap_err();
        assert!(err.to_string().contains("code 53"));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = LdapSink::new(LdapSinkConfig::default()).unwrap_err();
        assert!(matches!(err, SinkError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_sink_identity() {
        let sink = sink().with_name("ldap:oncall");
        assert_eq!(sink.name(), "ldap:oncall");
        assert_eq!(sink.kind(), SinkKind::Ldap);
        assert!(sink.policy().skip_unresolved);
        assert!(!format!("{sink:?}").contains("secret"));
    }
}
