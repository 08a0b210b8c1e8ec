//! In-memory directory adapter
//!
//! Keeps entries in a map keyed by normalized DN behind a tokio `RwLock`.
//! Every operation takes the lock once, so each request is atomic with
//! respect to the others, the same guarantee a directory server gives per
//! entry.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::dn::Dn;
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{AttributeDelta, Entry, Filter};
use crate::traits::DirectoryAdapter;

/// Directory adapter backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry without any checks (for seeding).
    pub async fn insert(&self, entry: Entry) {
        let mut entries = self.entries.write().await;
        entries.insert(entry.dn.normalized(), entry);
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the directory holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get a copy of an entry, if present.
    pub async fn get(&self, dn: &Dn) -> Option<Entry> {
        self.entries.read().await.get(&dn.normalized()).cloned()
    }
}

#[async_trait]
impl DirectoryAdapter for InMemoryDirectory {
    fn display_name(&self) -> &str {
        "in-memory"
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn))]
    async fn create_entry(&self, entry: Entry) -> DirectoryResult<()> {
        let mut entries = self.entries.write().await;
        let key = entry.dn.normalized();

        if entries.contains_key(&key) {
            return Err(DirectoryError::AlreadyExists {
                dn: entry.dn.to_string(),
            });
        }

        // Containers are implicit: no parent entry is required.
        entries.insert(key, entry);
        debug!("Entry created");
        Ok(())
    }

    #[instrument(skip(self, delta))]
    async fn modify_entry(&self, dn: &Dn, delta: &AttributeDelta) -> DirectoryResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(&dn.normalized())
            .ok_or_else(|| DirectoryError::not_found(dn.to_string()))?;

        let effective = delta.effective_against(entry);
        if effective.is_empty() {
            return Err(DirectoryError::empty_modification(dn.to_string()));
        }

        entry.apply(&effective);
        debug!(attributes = ?effective.affected_attributes(), "Entry modified");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, dn: &Dn) -> DirectoryResult<()> {
        let mut entries = self.entries.write().await;
        entries
            .remove(&dn.normalized())
            .map(|_| ())
            .ok_or_else(|| DirectoryError::not_found(dn.to_string()))
    }

    #[instrument(skip(self))]
    async fn fetch_entry(&self, dn: &Dn, attributes: &[&str]) -> DirectoryResult<Entry> {
        let entries = self.entries.read().await;
        entries
            .get(&dn.normalized())
            .cloned()
            .map(|entry| entry.project(attributes))
            .ok_or_else(|| DirectoryError::not_found(dn.to_string()))
    }

    #[instrument(skip(self, filter), fields(filter = %filter.to_ldap_string()))]
    async fn search_entries(
        &self,
        base: &Dn,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<Entry>> {
        let entries = self.entries.read().await;
        let found: Vec<Entry> = entries
            .values()
            .filter(|entry| base.is_root() || entry.dn == *base || entry.dn.is_descendant_of(base))
            .filter(|entry| filter.matches(entry))
            .cloned()
            .map(|entry| entry.project(attributes))
            .collect();

        debug!(count = found.len(), "In-memory search completed");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Dn {
        Dn::new("cn=users,cn=accounts,dc=example,dc=com")
    }

    fn user(uid: &str) -> Entry {
        Entry::new(container().child("uid", uid))
            .with("objectClass", ["top", "person", "posixaccount"])
            .with("uid", [uid])
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let dir = InMemoryDirectory::new();
        dir.create_entry(user("alice")).await.unwrap();

        let err = dir.create_entry(user("alice")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::AlreadyExists { .. }));
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn test_modify_missing_entry_is_not_found() {
        let dir = InMemoryDirectory::new();
        let mut delta = AttributeDelta::new();
        delta.replace("description", ["x"]);

        let err = dir
            .modify_entry(&container().child("uid", "ghost"), &delta)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_modify_without_change_is_empty_modification() {
        let dir = InMemoryDirectory::new();
        dir.insert(user("alice")).await;

        let mut delta = AttributeDelta::new();
        delta.add("uid", ["alice"]);

        let err = dir
            .modify_entry(&container().child("uid", "alice"), &delta)
            .await
            .unwrap_err();
        assert!(err.is_empty_modification());
    }

    #[tokio::test]
    async fn test_delete_then_fetch() {
        let dir = InMemoryDirectory::new();
        let dn = container().child("uid", "alice");
        dir.insert(user("alice")).await;

        dir.delete_entry(&dn).await.unwrap();
        assert!(dir.fetch_entry(&dn, &["*"]).await.unwrap_err().is_not_found());
        assert!(dir.delete_entry(&dn).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_search_scoped_to_base() {
        let dir = InMemoryDirectory::new();
        dir.insert(user("alice")).await;
        dir.insert(
            Entry::new("cn=admins,cn=groups,cn=accounts,dc=example,dc=com")
                .with("objectClass", ["groupofnames"])
                .with("cn", ["admins"]),
        )
        .await;

        let found = dir
            .search_entries(&container(), &Filter::present("objectClass"), &["uid"])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first("uid"), Some("alice"));
        assert!(!found[0].has("objectClass"));

        let none = dir
            .search_entries(&container(), &Filter::eq("uid", "bob"), &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_dn_default_impl() {
        let dir = InMemoryDirectory::new();
        dir.insert(user("alice")).await;

        let dn = dir
            .resolve_dn(&container(), "uid", "alice", "posixaccount")
            .await
            .unwrap();
        assert_eq!(dn, container().child("uid", "alice"));

        let err = dir
            .resolve_dn(&container(), "uid", "bob", "posixaccount")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
