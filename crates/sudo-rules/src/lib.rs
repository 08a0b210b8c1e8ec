//! # Sudo Rules
//!
//! Lifecycle and membership engine for sudo rules stored in a directory.
//!
//! A rule grants commands, on hosts, to users. Each dimension is either
//! categorical (`all`) or an explicit set of member references. This crate
//! validates rule input against a field table, resolves member identifiers
//! to directory entries, and performs the rule operations through a
//! [`DirectoryAdapter`](sudo_directory::traits::DirectoryAdapter).
//!
//! ## Crate Organization
//!
//! - [`schema`] - Field descriptors and input validation
//! - [`membership`] - Member kinds, relations and the resolver
//! - [`record`] - Typed view of a stored rule
//! - [`controller`] - Create, show, update, delete, find, enable, disable and member operations
//! - [`dispatch`] - Named commands and the dispatch table
//! - [`config`] - Directory layout configuration
//! - [`error`] - Error types

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod membership;
pub mod record;
pub mod schema;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::controller::{CommandOutput, MemberOutput, SearchOutput, SudoRuleController};
    pub use crate::dispatch::{CommandRegistry, CommandRequest, CommandResponse, SudoRuleCommand};
    pub use crate::error::{Result, RuleError, ValidationError};
    pub use crate::membership::{
        FailureReason, MemberAction, MemberFailure, MemberKind, MemberOutcome, MemberTargets,
        MembershipResolver, Relation,
    };
    pub use crate::record::{Category, RuleRecord};
    pub use crate::schema::{FieldDescriptor, FieldKind, Operation, RuleInput, RuleSchema};
}
