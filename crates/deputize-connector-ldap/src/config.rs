//! LDAP sink configuration

use std::time::Duration;

use deputize_core::error::{SinkError, SinkResult};
use deputize_core::types::SinkPolicy;
use serde::{Deserialize, Serialize};

/// Configuration for the LDAP on-call group sink.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapSinkConfig {
    /// Whether the sink takes part in a pass.
    #[serde(default)]
    pub enabled: bool,

    /// LDAP server hostname or IP address.
    #[serde(default)]
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Skip server certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Base DN for user and group searches (e.g., "dc=example,dc=com").
    #[serde(default)]
    pub base_dn: String,

    /// DN the sink binds as. Needs write access to the group.
    #[serde(default)]
    pub bind_dn: String,

    /// Bind password, filled in from the secret bundle.
    #[serde(skip)]
    pub bind_password: Option<String>,

    /// Filter locating the on-call group (e.g., "cn=oncall").
    #[serde(default)]
    pub group_filter: String,

    /// User attribute holding the email address.
    #[serde(default = "default_mail_attribute")]
    pub mail_attribute: String,

    /// User attribute stored in the group. `dn` uses the entry DN.
    #[serde(default = "default_user_attribute")]
    pub user_attribute: String,

    /// Group attribute listing the members.
    #[serde(default = "default_member_attribute")]
    pub member_attribute: String,

    /// Connect and per-operation timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Continue when an on-call email has no directory entry.
    #[serde(default = "default_skip_unresolved")]
    pub skip_unresolved: bool,
}

impl std::fmt::Debug for LdapSinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSinkConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("group_filter", &self.group_filter)
            .field("mail_attribute", &self.mail_attribute)
            .field("user_attribute", &self.user_attribute)
            .field("member_attribute", &self.member_attribute)
            .field("timeout_secs", &self.timeout_secs)
            .field("skip_unresolved", &self.skip_unresolved)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_use_starttls() -> bool {
    true
}

fn default_mail_attribute() -> String {
    "mail".to_string()
}

fn default_user_attribute() -> String {
    "uid".to_string()
}

fn default_member_attribute() -> String {
    "memberUid".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_skip_unresolved() -> bool {
    true
}

impl Default for LdapSinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: default_use_starttls(),
            insecure_skip_verify: false,
            base_dn: String::new(),
            bind_dn: String::new(),
            bind_password: None,
            group_filter: String::new(),
            mail_attribute: default_mail_attribute(),
            user_attribute: default_user_attribute(),
            member_attribute: default_member_attribute(),
            timeout_secs: default_timeout_secs(),
            skip_unresolved: default_skip_unresolved(),
        }
    }
}

impl LdapSinkConfig {
    /// Create a new config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
        group_filter: impl Into<String>,
    ) -> Self {
        Self {
            enabled: true,
            host: host.into(),
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            group_filter: group_filter.into(),
            ..Self::default()
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.use_starttls = false;
        self.port = 636;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Group filter in parenthesized form.
    #[must_use]
    pub fn group_search_filter(&self) -> String {
        let filter = self.group_filter.trim();
        if filter.starts_with('(') {
            filter.to_string()
        } else {
            format!("({filter})")
        }
    }

    /// Connect and per-operation timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether members are stored as entry DNs.
    #[must_use]
    pub fn uses_dn_members(&self) -> bool {
        self.user_attribute.eq_ignore_ascii_case("dn")
    }

    /// Policy handed to the reconciler.
    #[must_use]
    pub fn policy(&self) -> SinkPolicy {
        SinkPolicy {
            skip_unresolved: self.skip_unresolved,
            skip_when_empty: false,
        }
    }

    /// Every problem with the configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let required = [
            ("host", &self.host),
            ("base_dn", &self.base_dn),
            ("bind_dn", &self.bind_dn),
            ("group_filter", &self.group_filter),
            ("mail_attribute", &self.mail_attribute),
            ("user_attribute", &self.user_attribute),
            ("member_attribute", &self.member_attribute),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("{name} not configured"));
            }
        }
        if self.use_ssl && self.use_starttls {
            problems.push("cannot use both SSL and STARTTLS".to_string());
        }
        if self.timeout_secs == 0 {
            problems.push("timeout_secs must be greater than 0".to_string());
        }
        problems
    }

    /// Validate the configuration, reporting every problem at once.
    pub fn validate(&self) -> SinkResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SinkError::invalid_config(problems.join(", ")))
        }
    }
}
