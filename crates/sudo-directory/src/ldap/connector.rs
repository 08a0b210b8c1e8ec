//! LDAP directory adapter
//!
//! Implements [`DirectoryAdapter`] on top of an `ldap3` async connection.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchResult};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::dn::Dn;
use crate::error::{DirectoryError, DirectoryResult};
use crate::operation::{AttributeDelta, Entry, Filter, Modification};
use crate::traits::DirectoryAdapter;

use super::config::LdapConfig;

// LDAP result codes (RFC 4511, appendix A).
const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_CONSTRAINT_VIOLATION: u32 = 19;
const RC_NO_SUCH_OBJECT: u32 = 32;
const RC_INVALID_CREDENTIALS: u32 = 49;
const RC_INSUFFICIENT_ACCESS: u32 = 50;
const RC_BUSY: u32 = 51;
const RC_UNAVAILABLE: u32 = 52;
const RC_OBJECT_CLASS_VIOLATION: u32 = 65;
const RC_ALREADY_EXISTS: u32 = 68;

/// Directory adapter for an LDAP server.
pub struct LdapDirectory {
    /// Configuration.
    config: LdapConfig,

    /// Display name for this adapter instance.
    display_name: String,

    /// Cached LDAP connection (lazily initialized).
    connection: Arc<RwLock<Option<Ldap>>>,
}

impl LdapDirectory {
    /// Create a new LDAP adapter with the given configuration.
    pub fn new(config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;

        let display_name = format!("LDAP: {}", config.host);

        Ok(Self {
            config,
            display_name,
            connection: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an LDAP connection, creating one if necessary.
    async fn get_connection(&self) -> DirectoryResult<Ldap> {
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

    /// Create and bind a new LDAP connection.
    async fn create_connection(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();

        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.connection_timeout())
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {}", url),
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
            .simple_bind(bind_dn, bind_password)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("LDAP bind failed for {}", bind_dn),
                    e,
                )
            })?;

        if result.rc == RC_INVALID_CREDENTIALS {
            return Err(DirectoryError::AuthenticationFailed);
        }
        if result.rc != RC_SUCCESS {
            return Err(DirectoryError::connection_failed(format!(
                "LDAP bind failed with code {}: {}",
                result.rc, result.text
            )));
        }

        info!(host = %self.config.host, "LDAP connection established");

        Ok(ldap)
    }

    /// Close the cached connection, if any.
    pub async fn dispose(&self) -> DirectoryResult<()> {
        let mut conn_guard = self.connection.write().await;
        if let Some(mut ldap) = conn_guard.take() {
            if let Err(e) = ldap.unbind().await {
                warn!(error = %e, "Error during LDAP unbind");
            }
        }
        Ok(())
    }

    /// Translate an LDAP result code into the adapter's error taxonomy.
    fn check_result(rc: u32, text: &str, operation: &str, dn: &str) -> DirectoryResult<()> {
        match rc {
            RC_SUCCESS => Ok(()),
            RC_NO_SUCH_OBJECT => Err(DirectoryError::not_found(dn)),
            RC_ALREADY_EXISTS => Err(DirectoryError::AlreadyExists { dn: dn.to_string() }),
            RC_INSUFFICIENT_ACCESS => Err(DirectoryError::InsufficientAccess {
                operation: format!("{} on {}", operation, dn),
            }),
            RC_CONSTRAINT_VIOLATION | RC_OBJECT_CLASS_VIOLATION => {
                Err(DirectoryError::ConstraintViolation {
                    message: format!("{}: {}", dn, text),
                })
            }
            RC_BUSY | RC_UNAVAILABLE => Err(DirectoryError::Unavailable {
                message: text.to_string(),
            }),
            _ => Err(DirectoryError::operation_failed(format!(
                "LDAP {} failed with code {}: {}",
                operation, rc, text
            ))),
        }
    }

    /// Convert an ldap3 search entry into an [`Entry`].
    fn to_entry(search_entry: SearchEntry) -> Entry {
        let mut entry = Entry::new(Dn::new(search_entry.dn));
        for (name, values) in search_entry.attrs {
            entry.set(&name, values);
        }
        if !search_entry.bin_attrs.is_empty() {
            debug!(
                count = search_entry.bin_attrs.len(),
                "Skipping binary attributes"
            );
        }
        entry
    }

    /// Convert a delta into ldap3 modifications.
    fn to_mods(delta: &AttributeDelta) -> Vec<Mod<String>> {
        delta
            .iter()
            .map(|modification| match modification {
                Modification::Add(name, values) => {
                    Mod::Add(name.clone(), values.iter().cloned().collect())
                }
                Modification::Delete(name, values) => {
                    Mod::Delete(name.clone(), values.iter().cloned().collect())
                }
                Modification::Replace(name, values) => {
                    Mod::Replace(name.clone(), values.iter().cloned().collect())
                }
            })
            .collect()
    }

    fn requested(attributes: &[&str]) -> Vec<String> {
        if attributes.is_empty() {
            vec!["*".to_string()]
        } else {
            attributes.iter().map(|a| a.to_string()).collect()
        }
    }
}

#[async_trait]
impl DirectoryAdapter for LdapDirectory {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self, entry), fields(dn = %entry.dn))]
    async fn create_entry(&self, entry: Entry) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;
        let dn = entry.dn.to_string();

        let ldap_attrs: Vec<(String, HashSet<String>)> = entry
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.clone(), values.iter().cloned().collect()))
            .collect();

        debug!(attribute_count = ldap_attrs.len(), "Creating LDAP entry");

        let ldap_attrs_vec: Vec<(&str, HashSet<&str>)> = ldap_attrs
            .iter()
            .map(|(k, v)| (k.as_str(), v.iter().map(|s| s.as_str()).collect()))
            .collect();

        let result = ldap.add(&dn, ldap_attrs_vec).await.map_err(|e| {
            DirectoryError::operation_failed_with_source(format!("Failed to create entry: {}", dn), e)
        })?;

        Self::check_result(result.rc, &result.text, "add", &dn)?;

        info!(dn = %dn, "LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self, delta))]
    async fn modify_entry(&self, dn: &Dn, delta: &AttributeDelta) -> DirectoryResult<()> {
        let current = self.fetch_entry(dn, &delta.affected_attributes()).await?;

        let effective = delta.effective_against(&current);
        if effective.is_empty() {
            debug!("Modification would not change the entry");
            return Err(DirectoryError::empty_modification(dn.to_string()));
        }

        let mut ldap = self.get_connection().await?;
        let mods = Self::to_mods(&effective);

        debug!(attributes = ?effective.affected_attributes(), "Modifying LDAP entry");

        let result = ldap.modify(dn.as_str(), mods).await.map_err(|e| {
            DirectoryError::operation_failed_with_source(format!("Failed to update entry: {}", dn), e)
        })?;

        Self::check_result(result.rc, &result.text, "modify", dn.as_str())?;

        info!(dn = %dn, "LDAP entry updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, dn: &Dn) -> DirectoryResult<()> {
        let mut ldap = self.get_connection().await?;

        let result = ldap.delete(dn.as_str()).await.map_err(|e| {
            DirectoryError::operation_failed_with_source(format!("Failed to delete entry: {}", dn), e)
        })?;

        Self::check_result(result.rc, &result.text, "delete", dn.as_str())?;

        info!(dn = %dn, "LDAP entry deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_entry(&self, dn: &Dn, attributes: &[&str]) -> DirectoryResult<Entry> {
        let mut ldap = self.get_connection().await?;
        let attrs = Self::requested(attributes);

        let SearchResult(entries, result) = ldap
            .search(dn.as_str(), Scope::Base, "(objectClass=*)", attrs)
            .await
            .map_err(|e| DirectoryError::operation_failed_with_source("LDAP read failed", e))?;

        Self::check_result(result.rc, &result.text, "read", dn.as_str())?;

        entries
            .into_iter()
            .next()
            .map(SearchEntry::construct)
            .map(Self::to_entry)
            .ok_or_else(|| DirectoryError::not_found(dn.to_string()))
    }

    #[instrument(skip(self, filter))]
    async fn search_entries(
        &self,
        base: &Dn,
        filter: &Filter,
        attributes: &[&str],
    ) -> DirectoryResult<Vec<Entry>> {
        let mut ldap = self.get_connection().await?;
        let ldap_filter = filter.to_ldap_string();
        let attrs = Self::requested(attributes);

        debug!(filter = %ldap_filter, base_dn = %base, "Searching LDAP");

        let SearchResult(entries, result) = ldap
            .search(base.as_str(), Scope::Subtree, &ldap_filter, attrs)
            .await
            .map_err(|e| DirectoryError::operation_failed_with_source("LDAP search failed", e))?;

        match result.rc {
            RC_SUCCESS => {}
            // A missing search base simply has no entries under it.
            RC_NO_SUCH_OBJECT => return Ok(Vec::new()),
            RC_SIZE_LIMIT_EXCEEDED => {
                warn!(returned = entries.len(), "LDAP search hit the server size limit");
            }
            rc => Self::check_result(rc, &result.text, "search", base.as_str())?,
        }

        let found: Vec<Entry> = entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(Self::to_entry)
            .collect();

        info!(total_found = found.len(), "LDAP search completed");
        Ok(found)
    }
}

impl std::fmt::Debug for LdapDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectory")
            .field("display_name", &self.display_name)
            .field("config", &self.config.redacted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_new_validates_config() {
        let config = LdapConfig::new("", "dc=example,dc=com", "cn=dm");
        assert!(LdapDirectory::new(config).is_err());

        let config = LdapConfig::new("ipa.example.com", "dc=example,dc=com", "cn=dm");
        let dir = LdapDirectory::new(config).unwrap();
        assert_eq!(dir.display_name(), "LDAP: ipa.example.com");
    }

    #[test]
    fn test_result_code_mapping() {
        assert!(LdapDirectory::check_result(0, "", "modify", "cn=x").is_ok());
        assert!(LdapDirectory::check_result(32, "", "modify", "cn=x")
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            LdapDirectory::check_result(68, "", "add", "cn=x").unwrap_err(),
            DirectoryError::AlreadyExists { .. }
        ));
        assert!(matches!(
            LdapDirectory::check_result(50, "", "delete", "cn=x").unwrap_err(),
            DirectoryError::InsufficientAccess { .. }
        ));
        assert!(LdapDirectory::check_result(52, "down", "read", "cn=x")
            .unwrap_err()
            .is_transient());
        assert!(matches!(
            LdapDirectory::check_result(80, "other", "read", "cn=x").unwrap_err(),
            DirectoryError::OperationFailed { .. }
        ));
    }

    #[test]
    fn test_search_entry_conversion() {
        let search_entry = SearchEntry {
            dn: "ipaUniqueID=1,cn=sudorules,cn=sudo,dc=example,dc=com".to_string(),
            attrs: HashMap::from([
                ("cn".to_string(), vec!["webadmins".to_string()]),
                (
                    "memberUser".to_string(),
                    vec!["uid=alice,cn=users".to_string(), "uid=bob,cn=users".to_string()],
                ),
            ]),
            bin_attrs: HashMap::new(),
        };

        let entry = LdapDirectory::to_entry(search_entry);
        assert_eq!(entry.first("cn"), Some("webadmins"));
        assert_eq!(entry.get("memberuser").len(), 2);
    }

    #[test]
    fn test_delta_to_mods() {
        let mut delta = AttributeDelta::new();
        delta
            .add("memberUser", ["uid=alice,cn=users"])
            .replace("ipaEnabledFlag", ["FALSE"])
            .clear_attribute("description");

        let mods = LdapDirectory::to_mods(&delta);
        assert_eq!(mods.len(), 3);
        assert!(matches!(&mods[0], Mod::Add(name, values) if name == "memberUser" && values.len() == 1));
        assert!(matches!(&mods[2], Mod::Replace(name, values) if name == "description" && values.is_empty()));
    }
}
