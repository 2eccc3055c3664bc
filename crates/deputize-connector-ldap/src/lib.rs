//! # LDAP sink
//!
//! Keeps an LDAP on-call group in line with the on-call roster.
//!
//! On-call emails are resolved with a subtree search on the mail attribute;
//! the group is located by filter and its member attribute is modified one
//! value at a time.
//!
//! ## Example
//!
//! ```ignore
//! use deputize_connector_ldap::{LdapSink, LdapSinkConfig};
//!
//! let config = LdapSinkConfig::new(
//!     "ldap.example.com",
//!     "dc=example,dc=com",
//!     "cn=deputize,ou=svc,dc=example,dc=com",
//!     "cn=oncall",
//! )
//! .with_password(secret);
//!
//! let sink = LdapSink::new(config)?;
//! ```

pub mod config;
pub mod connector;

pub use config::LdapSinkConfig;
pub use connector::LdapSink;
