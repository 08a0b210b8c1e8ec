//! # Directory Adapter
//!
//! Record-level access to an LDAP-style directory for the sudo rule engine.
//!
//! The engine never talks to a server directly. It goes through the
//! [`DirectoryAdapter`](traits::DirectoryAdapter) trait, which offers atomic
//! single-entry create, modify, delete, fetch and subtree search, and reports
//! the conditions the engine needs to tell apart (missing entry, duplicate
//! entry, no-op modification) as distinct error variants.
//!
//! ## Example
//!
//! ```ignore
//! use sudo_directory::prelude::*;
//!
//! let config = LdapConfig::new("ipa.example.com", "dc=example,dc=com", "cn=Directory Manager")
//!     .with_password("secret")
//!     .with_starttls();
//! let directory = LdapDirectory::new(config)?;
//!
//! let entry = directory
//!     .fetch_entry(&Dn::new("uid=alice,cn=users,cn=accounts,dc=example,dc=com"), &["uid"])
//!     .await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`dn`] - Distinguished names and RDN escaping
//! - [`error`] - Error types with transient/permanent classification
//! - [`operation`] - Entries, attribute deltas and search filters
//! - [`traits`] - The adapter contract
//! - [`memory`] - In-process adapter used by tests and tooling
//! - [`ldap`] - ldap3-backed adapter

pub mod dn;
pub mod error;
pub mod ldap;
pub mod memory;
pub mod operation;
pub mod traits;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::dn::{escape_dn_value, Dn};
    pub use crate::error::{DirectoryError, DirectoryResult};
    pub use crate::ldap::{LdapConfig, LdapDirectory};
    pub use crate::memory::InMemoryDirectory;
    pub use crate::operation::{AttributeDelta, Entry, Filter, Modification};
    pub use crate::traits::DirectoryAdapter;
}

// Re-export async_trait for adapter implementors
pub use async_trait::async_trait;
