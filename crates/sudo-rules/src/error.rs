//! Error types for the sudo rule engine.

use sudo_directory::error::DirectoryError;
use thiserror::Error;

/// Rejected caller input. Raised before any directory request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required attribute is missing.
    #[error("'{attribute}' is required")]
    Required { attribute: String },

    /// The attribute is not part of the rule schema.
    #[error("unknown attribute: {attribute}")]
    UnknownAttribute { attribute: String },

    /// The value is outside the attribute's allowed set.
    #[error("invalid '{attribute}': must be one of {allowed} (got \"{value}\")")]
    InvalidValue {
        attribute: String,
        value: String,
        allowed: String,
    },

    /// The attribute may not be supplied to this operation.
    #[error("attribute '{attribute}' is not allowed in {operation}")]
    NotPermitted { attribute: String, operation: String },

    /// A single-valued attribute was given several values.
    #[error("'{attribute}' takes a single value")]
    TooManyValues { attribute: String },

    /// A value that must not be blank was blank.
    #[error("'{attribute}' must not be empty")]
    Empty { attribute: String },
}

/// Errors surfaced by rule operations.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule name does not resolve to an existing record.
    #[error("{name}: Sudo Rule not found")]
    NotFound { name: String },

    /// A rule with this name already exists.
    #[error("Sudo Rule with name \"{name}\" already exists")]
    DuplicateKey { name: String },

    /// Input rejected by the rule schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The command name is not registered.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The request lacks a parameter the command needs.
    #[error("invalid request for {command}: {message}")]
    InvalidRequest { command: String, message: String },

    /// A stored entry could not be interpreted as a rule.
    #[error("malformed rule entry {dn}: {message}")]
    MalformedEntry { dn: String, message: String },

    /// Output could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Directory failure not absorbed by the engine (transport, access, ...).
    #[error("directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl RuleError {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuleError::NotFound { .. })
    }

    /// Check if a retry might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RuleError::Directory(e) if e.is_transient())
    }

    /// Get a stable error code for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            RuleError::NotFound { .. } => "NOT_FOUND",
            RuleError::DuplicateKey { .. } => "DUPLICATE_KEY",
            RuleError::Validation(_) => "VALIDATION_ERROR",
            RuleError::UnknownCommand(_) => "UNKNOWN_COMMAND",
            RuleError::InvalidRequest { .. } => "INVALID_REQUEST",
            RuleError::MalformedEntry { .. } => "MALFORMED_ENTRY",
            RuleError::Serialization(_) => "SERIALIZATION_ERROR",
            RuleError::Directory(e) => e.error_code(),
        }
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        RuleError::NotFound { name: name.into() }
    }
}

/// Convenience Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
