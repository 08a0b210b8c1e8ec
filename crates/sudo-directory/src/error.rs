//! Directory adapter error types
//!
//! Error definitions with transient/permanent classification. The
//! `EmptyModification` and `NotFound` variants are signals the rule engine
//! pattern-matches on; everything else is passed through to callers.

use thiserror::Error;

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Entry-level conditions
    /// The entry does not exist.
    #[error("entry not found: {dn}")]
    NotFound { dn: String },

    /// An entry with this DN already exists.
    #[error("entry already exists: {dn}")]
    AlreadyExists { dn: String },

    /// The modification would not change the entry.
    #[error("no modifications to be performed on {dn}")]
    EmptyModification { dn: String },

    /// The entry or request violates a directory constraint.
    #[error("constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Invalid DN, filter or attribute data.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Connection errors (usually transient)
    /// Failed to establish connection to the directory server.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The directory server is temporarily unavailable.
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },

    // Authentication errors (permanent)
    /// Bind credentials were rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    /// The bound identity may not perform the operation.
    #[error("insufficient access rights for {operation}")]
    InsufficientAccess { operation: String },

    // Configuration errors (permanent)
    /// Adapter configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Any other directory operation failure.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DirectoryError {
    /// Check if this error is transient and the operation could be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::Unavailable { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Check if this is the "entry does not exist" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DirectoryError::NotFound { .. })
    }

    /// Check if this is the "nothing to modify" signal.
    pub fn is_empty_modification(&self) -> bool {
        matches!(self, DirectoryError::EmptyModification { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::NotFound { .. } => "NOT_FOUND",
            DirectoryError::AlreadyExists { .. } => "ALREADY_EXISTS",
            DirectoryError::EmptyModification { .. } => "EMPTY_MODIFICATION",
            DirectoryError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            DirectoryError::InvalidData { .. } => "INVALID_DATA",
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::Unavailable { .. } => "UNAVAILABLE",
            DirectoryError::AuthenticationFailed => "AUTH_FAILED",
            DirectoryError::InsufficientAccess { .. } => "INSUFFICIENT_ACCESS",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a not-found error.
    pub fn not_found(dn: impl Into<String>) -> Self {
        DirectoryError::NotFound { dn: dn.into() }
    }

    /// Create an empty-modification signal.
    pub fn empty_modification(dn: impl Into<String>) -> Self {
        DirectoryError::EmptyModification { dn: dn.into() }
    }

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        DirectoryError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
