//! Engine configuration: where rules and the entities they reference live.

use serde::{Deserialize, Serialize};
use sudo_directory::dn::Dn;

use crate::membership::MemberKind;

/// Directory layout used by the rule engine.
///
/// Containers are relative DNs appended to `base_dn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory suffix (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Container holding sudo rules.
    #[serde(default = "default_sudorule_container")]
    pub sudorule_container: String,

    /// Container holding users.
    #[serde(default = "default_user_container")]
    pub user_container: String,

    /// Container holding user groups.
    #[serde(default = "default_group_container")]
    pub group_container: String,

    /// Container holding hosts.
    #[serde(default = "default_host_container")]
    pub host_container: String,

    /// Container holding host groups.
    #[serde(default = "default_hostgroup_container")]
    pub hostgroup_container: String,

    /// Container holding sudo commands.
    #[serde(default = "default_sudocmd_container")]
    pub sudocmd_container: String,

    /// Container holding sudo command groups.
    #[serde(default = "default_sudocmdgroup_container")]
    pub sudocmdgroup_container: String,

    /// Maximum number of rules returned by a search.
    #[serde(default = "default_search_size_limit")]
    pub search_size_limit: usize,
}

fn default_sudorule_container() -> String {
    "cn=sudorules,cn=sudo".to_string()
}

fn default_user_container() -> String {
    "cn=users,cn=accounts".to_string()
}

fn default_group_container() -> String {
    "cn=groups,cn=accounts".to_string()
}

fn default_host_container() -> String {
    "cn=computers,cn=accounts".to_string()
}

fn default_hostgroup_container() -> String {
    "cn=hostgroups,cn=accounts".to_string()
}

fn default_sudocmd_container() -> String {
    "cn=sudocmds,cn=sudo".to_string()
}

fn default_sudocmdgroup_container() -> String {
    "cn=sudocmdgroups,cn=sudo".to_string()
}

fn default_search_size_limit() -> usize {
    100
}

impl EngineConfig {
    /// Create a config with the default container layout.
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            sudorule_container: default_sudorule_container(),
            user_container: default_user_container(),
            group_container: default_group_container(),
            host_container: default_host_container(),
            hostgroup_container: default_hostgroup_container(),
            sudocmd_container: default_sudocmd_container(),
            sudocmdgroup_container: default_sudocmdgroup_container(),
            search_size_limit: default_search_size_limit(),
        }
    }

    /// Set the search size limit.
    #[must_use]
    pub fn with_search_size_limit(mut self, limit: usize) -> Self {
        self.search_size_limit = limit;
        self
    }

    /// Directory suffix as a DN.
    pub fn base(&self) -> Dn {
        Dn::new(self.base_dn.clone())
    }

    /// Full DN of the sudo rule container.
    pub fn sudorule_base(&self) -> Dn {
        self.base().prepend(&self.sudorule_container)
    }

    /// Full DN of the container holding entities of `kind`.
    pub fn container_for(&self, kind: MemberKind) -> Dn {
        let relative = match kind {
            MemberKind::User => &self.user_container,
            MemberKind::Group => &self.group_container,
            MemberKind::Host => &self.host_container,
            MemberKind::HostGroup => &self.hostgroup_container,
            MemberKind::SudoCmd => &self.sudocmd_container,
            MemberKind::SudoCmdGroup => &self.sudocmdgroup_container,
        };
        self.base().prepend(relative)
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let base_dn = reader("SUDO_BASE_DN")
            .or_else(|_| reader("LDAP_BASE_DN"))
            .map_err(|_| ConfigError::MissingVar("SUDO_BASE_DN".into()))?;

        if base_dn.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "SUDO_BASE_DN".into(),
                "must not be empty".into(),
            ));
        }

        let mut config = Self::new(base_dn.trim());

        let overrides: [(&str, &mut String); 7] = [
            ("SUDO_CONTAINER_SUDORULES", &mut config.sudorule_container),
            ("SUDO_CONTAINER_USERS", &mut config.user_container),
            ("SUDO_CONTAINER_GROUPS", &mut config.group_container),
            ("SUDO_CONTAINER_HOSTS", &mut config.host_container),
            ("SUDO_CONTAINER_HOSTGROUPS", &mut config.hostgroup_container),
            ("SUDO_CONTAINER_SUDOCMDS", &mut config.sudocmd_container),
            ("SUDO_CONTAINER_SUDOCMDGROUPS", &mut config.sudocmdgroup_container),
        ];
        for (key, slot) in overrides {
            if let Ok(value) = reader(key) {
                *slot = value;
            }
        }

        if let Ok(raw) = reader("SUDO_SEARCH_SIZE_LIMIT") {
            config.search_size_limit = raw
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue("SUDO_SEARCH_SIZE_LIMIT".into(), e.to_string()))?;
        }

        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
