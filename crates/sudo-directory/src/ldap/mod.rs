//! ldap3-backed directory adapter.

pub mod config;
pub mod connector;

pub use config::LdapConfig;
pub use connector::LdapDirectory;
