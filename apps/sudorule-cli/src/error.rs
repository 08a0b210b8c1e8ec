//! CLI error types and exit codes

use sudo_directory::error::DirectoryError;
use sudo_rules::error::RuleError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: Configuration error
/// - 2: Authentication failed
/// - 3: Directory unreachable
/// - 4: Rejected request (validation, not found, duplicate)
/// - 5: Directory error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<DirectoryError> for CliError {
    fn from(error: DirectoryError) -> Self {
        CliError::Rule(RuleError::Directory(error))
    }
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 1,
            CliError::Rule(RuleError::Directory(DirectoryError::AuthenticationFailed)) => 2,
            CliError::Rule(RuleError::Directory(DirectoryError::InvalidConfiguration { .. })) => 1,
            CliError::Rule(e) if e.is_transient() => 3,
            CliError::Rule(
                RuleError::NotFound { .. }
                | RuleError::DuplicateKey { .. }
                | RuleError::Validation(_)
                | RuleError::InvalidRequest { .. }
                | RuleError::UnknownCommand(_),
            ) => 4,
            CliError::Rule(_) | CliError::Output(_) => 5,
        }
    }

    /// Print the error to stderr.
    pub fn print(&self) {
        if std::env::var("NO_COLOR").is_err() {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            eprintln!("\nSuggestion: {}", suggestion);
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Set LDAP_HOST, LDAP_BASE_DN and LDAP_BIND_DN (or add them to .env)."),
            CliError::Rule(RuleError::Directory(DirectoryError::AuthenticationFailed)) => {
                Some("Check LDAP_BIND_DN and LDAP_BIND_PASSWORD.")
            }
            CliError::Rule(e) if e.is_transient() => Some("Check that the directory server is reachable."),
            _ => None,
        }
    }
}
