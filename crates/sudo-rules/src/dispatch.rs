//! Command dispatch
//!
//! The rule operations exposed under their command names. A
//! [`CommandRegistry`] is an owned dispatch table built at startup; callers
//! look commands up by name and execute a [`CommandRequest`] to get a
//! serializable [`CommandResponse`].
//!
//! # Example
//!
//! ```ignore
//! let controller = Arc::new(SudoRuleController::new(directory, config));
//! let registry = CommandRegistry::with_sudorule_commands(controller);
//!
//! let response = registry
//!     .dispatch("sudorule-add-user", CommandRequest::for_rule("webadmins")
//!         .with_members(MemberKind::User, ["alice"]))
//!     .await?;
//! println!("{}", response.summary.unwrap_or_default());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::controller::{CommandOutput, MemberOutput, SudoRuleController};
use crate::error::{Result, RuleError};
use crate::membership::{MemberFailure, MemberKind, MemberTargets};
use crate::schema::RuleInput;

/// The sudo rule commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SudoRuleCommand {
    Add,
    Del,
    Mod,
    Find,
    Show,
    Enable,
    Disable,
    AddAllowCommand,
    RemoveAllowCommand,
    AddDenyCommand,
    RemoveDenyCommand,
    AddUser,
    RemoveUser,
    AddHost,
    RemoveHost,
}

impl SudoRuleCommand {
    /// All commands, in registration order.
    pub const ALL: [SudoRuleCommand; 15] = [
        SudoRuleCommand::Add,
        SudoRuleCommand::Del,
        SudoRuleCommand::Mod,
        SudoRuleCommand::Find,
        SudoRuleCommand::Show,
        SudoRuleCommand::Enable,
        SudoRuleCommand::Disable,
        SudoRuleCommand::AddAllowCommand,
        SudoRuleCommand::RemoveAllowCommand,
        SudoRuleCommand::AddDenyCommand,
        SudoRuleCommand::RemoveDenyCommand,
        SudoRuleCommand::AddUser,
        SudoRuleCommand::RemoveUser,
        SudoRuleCommand::AddHost,
        SudoRuleCommand::RemoveHost,
    ];

    /// Registered command name.
    pub fn name(self) -> &'static str {
        match self {
            SudoRuleCommand::Add => "sudorule-add",
            SudoRuleCommand::Del => "sudorule-del",
            SudoRuleCommand::Mod => "sudorule-mod",
            SudoRuleCommand::Find => "sudorule-find",
            SudoRuleCommand::Show => "sudorule-show",
            SudoRuleCommand::Enable => "sudorule-enable",
            SudoRuleCommand::Disable => "sudorule-disable",
            SudoRuleCommand::AddAllowCommand => "sudorule-add-allow-command",
            SudoRuleCommand::RemoveAllowCommand => "sudorule-remove-allow-command",
            SudoRuleCommand::AddDenyCommand => "sudorule-add-deny-command",
            SudoRuleCommand::RemoveDenyCommand => "sudorule-remove-deny-command",
            SudoRuleCommand::AddUser => "sudorule-add-user",
            SudoRuleCommand::RemoveUser => "sudorule-remove-user",
            SudoRuleCommand::AddHost => "sudorule-add-host",
            SudoRuleCommand::RemoveHost => "sudorule-remove-host",
        }
    }

    /// One-line help text.
    pub fn doc(self) -> &'static str {
        match self {
            SudoRuleCommand::Add => "Create new Sudo Rule.",
            SudoRuleCommand::Del => "Delete Sudo Rule.",
            SudoRuleCommand::Mod => "Modify Sudo Rule.",
            SudoRuleCommand::Find => "Search for Sudo Rule.",
            SudoRuleCommand::Show => "Display Sudo Rule.",
            SudoRuleCommand::Enable => "Enable a Sudo rule.",
            SudoRuleCommand::Disable => "Disable a Sudo rule.",
            SudoRuleCommand::AddAllowCommand => {
                "Add commands and sudo command groups affected by Sudo Rule."
            }
            SudoRuleCommand::RemoveAllowCommand => {
                "Remove commands and sudo command groups affected by Sudo Rule."
            }
            SudoRuleCommand::AddDenyCommand => {
                "Add commands and sudo command groups denied by Sudo Rule."
            }
            SudoRuleCommand::RemoveDenyCommand => {
                "Remove commands and sudo command groups denied by Sudo Rule."
            }
            SudoRuleCommand::AddUser => "Add users and groups affected by Sudo Rule.",
            SudoRuleCommand::RemoveUser => "Remove users and groups affected by Sudo Rule.",
            SudoRuleCommand::AddHost => "Add hosts and hostgroups affected by Sudo Rule.",
            SudoRuleCommand::RemoveHost => "Remove hosts and hostgroups affected by Sudo Rule.",
        }
    }

    /// Whether the command takes a rule name.
    pub fn takes_name(self) -> bool {
        self != SudoRuleCommand::Find
    }
}

impl fmt::Display for SudoRuleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SudoRuleCommand {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self> {
        SudoRuleCommand::ALL
            .into_iter()
            .find(|command| command.name() == s)
            .ok_or_else(|| RuleError::UnknownCommand(s.to_string()))
    }
}

/// Parameters of a command invocation.
///
/// Which fields are read depends on the command: `name` for everything but
/// search, `attributes` for add/mod (and as equality filters for find),
/// `criteria` for find and `targets` for member commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "RuleInput::is_empty")]
    pub attributes: RuleInput,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,

    #[serde(default, skip_serializing_if = "MemberTargets::is_empty")]
    pub targets: MemberTargets,
}

impl CommandRequest {
    /// Request addressing one rule.
    pub fn for_rule(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Search request.
    pub fn search(criteria: Option<String>) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with_attribute<I, S>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(
            attribute.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Add member identifiers using builder pattern.
    #[must_use]
    pub fn with_members<I, S>(mut self, kind: MemberKind, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(kind, identifiers);
        self
    }
}

/// Serializable result of a command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub command: String,
    pub success: bool,
    /// Whether the directory changed.
    pub changed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Number of rules returned (find).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,

    /// Number of members added or removed (member commands).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_count: Option<usize>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<MemberFailure>,

    pub result: serde_json::Value,
}

impl CommandResponse {
    fn from_output<T: Serialize>(command: SudoRuleCommand, output: CommandOutput<T>) -> Result<Self> {
        Ok(Self {
            command: command.name().to_string(),
            success: true,
            changed: output.changed,
            value: Some(output.value),
            summary: output.summary,
            count: None,
            truncated: None,
            affected_count: None,
            failed: Vec::new(),
            result: serde_json::to_value(&output.result)?,
        })
    }

    fn from_members(command: SudoRuleCommand, output: MemberOutput) -> Result<Self> {
        Ok(Self {
            command: command.name().to_string(),
            success: true,
            changed: output.changed,
            affected_count: Some(output.affected_count()),
            value: Some(output.value),
            summary: Some(output.summary),
            count: None,
            truncated: None,
            failed: output.outcome.failed,
            result: serde_json::to_value(&output.result)?,
        })
    }
}

/// Dispatch table of rule commands.
pub struct CommandRegistry {
    controller: Arc<SudoRuleController>,
    commands: BTreeMap<&'static str, SudoRuleCommand>,
}

impl CommandRegistry {
    /// Create an empty registry over `controller`.
    pub fn new(controller: Arc<SudoRuleController>) -> Self {
        Self {
            controller,
            commands: BTreeMap::new(),
        }
    }

    /// Create a registry with every sudo rule command registered.
    pub fn with_sudorule_commands(controller: Arc<SudoRuleController>) -> Self {
        let mut registry = Self::new(controller);
        for command in SudoRuleCommand::ALL {
            registry.register(command);
        }
        registry
    }

    /// Register a command under its name.
    pub fn register(&mut self, command: SudoRuleCommand) {
        self.commands.insert(command.name(), command);
    }

    /// Check if a command name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Look up a command by name.
    pub fn lookup(&self, name: &str) -> Option<SudoRuleCommand> {
        self.commands.get(name).copied()
    }

    /// Registered commands, sorted by name.
    pub fn commands(&self) -> impl Iterator<Item = SudoRuleCommand> + '_ {
        self.commands.values().copied()
    }

    /// The controller commands execute against.
    pub fn controller(&self) -> &SudoRuleController {
        &self.controller
    }

    /// Execute a command by name.
    #[instrument(skip(self, request))]
    pub async fn dispatch(&self, name: &str, request: CommandRequest) -> Result<CommandResponse> {
        let command = self
            .lookup(name)
            .ok_or_else(|| RuleError::UnknownCommand(name.to_string()))?;
        self.execute(command, request).await
    }

    /// Execute a command.
    pub async fn execute(
        &self,
        command: SudoRuleCommand,
        request: CommandRequest,
    ) -> Result<CommandResponse> {
        debug!(%command, "Executing command");

        if command == SudoRuleCommand::Find {
            let output = self
                .controller
                .find(request.criteria.as_deref(), &request.attributes)
                .await?;
            return Ok(CommandResponse {
                command: command.name().to_string(),
                success: true,
                changed: false,
                value: None,
                summary: Some(output.summary),
                count: Some(output.count),
                truncated: Some(output.truncated),
                affected_count: None,
                failed: Vec::new(),
                result: serde_json::to_value(&output.result)?,
            });
        }

        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RuleError::InvalidRequest {
                command: command.name().to_string(),
                message: "a rule name is required".to_string(),
            })?;
        let controller = &self.controller;
        let targets = &request.targets;

        match command {
            SudoRuleCommand::Add => CommandResponse::from_output(
                command,
                controller.create(name, request.attributes.clone()).await?,
            ),
            SudoRuleCommand::Del => {
                CommandResponse::from_output(command, controller.delete(name).await?)
            }
            SudoRuleCommand::Mod => CommandResponse::from_output(
                command,
                controller.update(name, request.attributes.clone()).await?,
            ),
            SudoRuleCommand::Show => {
                CommandResponse::from_output(command, controller.show(name).await?)
            }
            SudoRuleCommand::Enable => {
                CommandResponse::from_output(command, controller.enable(name).await?)
            }
            SudoRuleCommand::Disable => {
                CommandResponse::from_output(command, controller.disable(name).await?)
            }
            SudoRuleCommand::AddAllowCommand => CommandResponse::from_members(
                command,
                controller.add_allow_command(name, targets).await?,
            ),
            SudoRuleCommand::RemoveAllowCommand => CommandResponse::from_members(
                command,
                controller.remove_allow_command(name, targets).await?,
            ),
            SudoRuleCommand::AddDenyCommand => CommandResponse::from_members(
                command,
                controller.add_deny_command(name, targets).await?,
            ),
            SudoRuleCommand::RemoveDenyCommand => CommandResponse::from_members(
                command,
                controller.remove_deny_command(name, targets).await?,
            ),
            SudoRuleCommand::AddUser => {
                CommandResponse::from_members(command, controller.add_user(name, targets).await?)
            }
            SudoRuleCommand::RemoveUser => CommandResponse::from_members(
                command,
                controller.remove_user(name, targets).await?,
            ),
            SudoRuleCommand::AddHost => {
                CommandResponse::from_members(command, controller.add_host(name, targets).await?)
            }
            SudoRuleCommand::RemoveHost => CommandResponse::from_members(
                command,
                controller.remove_host(name, targets).await?,
            ),
            SudoRuleCommand::Find => Err(RuleError::InvalidRequest {
                command: command.name().to_string(),
                message: "search takes no rule name".to_string(),
            }),
        }
    }
}
