//! LDAP adapter configuration
//!
//! Connection settings for the ldap3-backed adapter, loadable from the
//! environment or from an injected variable reader.

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Configuration for [`LdapDirectory`](super::LdapDirectory).
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Base DN of the directory suffix (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication (e.g., "cn=Directory Manager").
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_connection_timeout() -> u64 {
    30
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            connection_timeout_secs: default_connection_timeout(),
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
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Get the connection timeout as a Duration.
    #[must_use]
    pub fn connection_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.connection_timeout_secs)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "host is required".to_string(),
            });
        }

        if self.base_dn.is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "base_dn is required".to_string(),
            });
        }

        if self.bind_dn.is_empty() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "bind_dn is required".to_string(),
            });
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::InvalidConfiguration {
                message: "cannot use both SSL and STARTTLS".to_string(),
            });
        }

        Ok(())
    }

    /// Create a redacted copy for logging/display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.bind_password.is_some() {
            config.bind_password = Some("***REDACTED***".to_string());
        }
        config
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> DirectoryResult<Self> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Lets tests supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> DirectoryResult<Self>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let required = |key: &str| {
            reader(key).map_err(|_| DirectoryError::InvalidConfiguration {
                message: format!("missing required environment variable: {key}"),
            })
        };
        let flag = |key: &str| {
            reader(key)
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false)
        };

        let use_ssl = flag("LDAP_USE_SSL");
        let port = match reader("LDAP_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| DirectoryError::InvalidConfiguration {
                message: format!("invalid value for LDAP_PORT: {e}"),
            })?,
            Err(_) if use_ssl => 636,
            Err(_) => default_ldap_port(),
        };
        let connection_timeout_secs = reader("LDAP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or_else(default_connection_timeout);

        let config = Self {
            host: required("LDAP_HOST")?,
            port,
            use_ssl,
            use_starttls: flag("LDAP_USE_STARTTLS"),
            base_dn: required("LDAP_BASE_DN")?,
            bind_dn: required("LDAP_BIND_DN")?,
            bind_password: reader("LDAP_BIND_PASSWORD").ok(),
            connection_timeout_secs,
        };

        config.validate()?;
        Ok(config)
    }
}
