//! Directory adapter trait
//!
//! The record-level contract the rule engine consumes. Every method is a
//! single request against the store; implementations report the
//! distinguishable conditions through [`DirectoryError`] variants rather than
//! panicking or returning sentinel values:
//!
//! - `create_entry` → [`DirectoryError::AlreadyExists`]
//! - `modify_entry` → [`DirectoryError::EmptyModification`], [`DirectoryError::NotFound`]
//! - `delete_entry`, `fetch_entry` → [`DirectoryError::NotFound`]
//!
//! [`DirectoryError`]: crate::error::DirectoryError
//! [`DirectoryError::AlreadyExists`]: crate::error::DirectoryError::AlreadyExists
//! [`DirectoryError::EmptyModification`]: crate::error::DirectoryError::EmptyModification
//! [`DirectoryError::NotFound`]: crate::error::DirectoryError::NotFound

use async_trait::async_trait;

use crate::dn::Dn;
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{AttributeDelta, Entry, Filter};

/// Atomic single-entry operations against a directory store.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    /// Display name for this adapter instance (used in logs).
    fn display_name(&self) -> &str;

    /// Create a new entry.
    async fn create_entry(&self, entry: Entry) -> DirectoryResult<()>;

    /// Apply a delta atomically.
    ///
    /// Fails with `EmptyModification` when the delta would leave the entry
    /// unchanged.
    async fn modify_entry(&self, dn: &Dn, delta: &AttributeDelta) -> DirectoryResult<()>;

    /// Delete an entry.
    async fn delete_entry(&self, dn: &Dn) -> DirectoryResult<()>;

    /// Read a single entry, returning only `attributes` (`*` or empty for all).
    async fn fetch_entry(&self, dn: &Dn, attributes: &[&str]) -> DirectoryResult<Entry>;

    /// Search the subtree under `base`. Zero matches is an empty vector.
    async fn search_entries(
        &self,
        base: &Dn,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<Entry>>;

    /// Resolve the DN of the entry under `container` whose `key_attribute`
    /// equals `key` and which carries `object_class`.
    ///
    /// Fails with `NotFound` when no entry matches.
    async fn resolve_dn(
        &self,
        container: &Dn,
        key_attribute: &str,
        key: &str,
        object_class: &str,
    ) -> DirectoryResult<Dn> {
        let filter = Filter::and(vec![
            Filter::eq("objectClass", object_class),
            Filter::eq(key_attribute, key),
        ]);

        let entries = self.search_entries(container, &filter, &["objectClass"]).await?;
        entries
            .into_iter()
            .next()
            .map(|entry| entry.dn)
            .ok_or_else(|| DirectoryError::not_found(container.child(key_attribute, key).to_string()))
    }
}
