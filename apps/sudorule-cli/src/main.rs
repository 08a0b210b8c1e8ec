//! sudorule - Command-line front end for sudo rule management
//!
//! Each subcommand maps onto one registered `sudorule-*` command and runs it
//! against the LDAP directory configured through the environment (or `.env`).

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use sudo_directory::ldap::{LdapConfig, LdapDirectory};
use sudo_directory::traits::DirectoryAdapter;
use sudo_rules::config::EngineConfig;
use sudo_rules::controller::SudoRuleController;
use sudo_rules::dispatch::{CommandRegistry, CommandRequest, SudoRuleCommand};
use sudo_rules::membership::MemberKind;
use sudo_rules::schema::{
    ATTR_CMD_CATEGORY, ATTR_DESCRIPTION, ATTR_HOST_CATEGORY, ATTR_USER_CATEGORY,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod output;

use error::{CliError, CliResult};

/// sudorule - Manage sudo rules in the directory
#[derive(Parser)]
#[command(name = "sudorule")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Print the raw command response as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create new Sudo Rule
    Add(RuleFieldArgs),

    /// Delete Sudo Rule
    Del(NameArgs),

    /// Modify Sudo Rule
    Mod(RuleFieldArgs),

    /// Search for Sudo Rule
    Find(FindArgs),

    /// Display Sudo Rule
    Show(NameArgs),

    /// Enable a Sudo rule
    Enable(NameArgs),

    /// Disable a Sudo rule
    Disable(NameArgs),

    /// Add commands and sudo command groups affected by Sudo Rule
    AddAllowCommand(CommandMemberArgs),

    /// Remove commands and sudo command groups affected by Sudo Rule
    RemoveAllowCommand(CommandMemberArgs),

    /// Add commands and sudo command groups denied by Sudo Rule
    AddDenyCommand(CommandMemberArgs),

    /// Remove commands and sudo command groups denied by Sudo Rule
    RemoveDenyCommand(CommandMemberArgs),

    /// Add users and groups affected by Sudo Rule
    AddUser(UserMemberArgs),

    /// Remove users and groups affected by Sudo Rule
    RemoveUser(UserMemberArgs),

    /// Add hosts and hostgroups affected by Sudo Rule
    AddHost(HostMemberArgs),

    /// Remove hosts and hostgroups affected by Sudo Rule
    RemoveHost(HostMemberArgs),
}

#[derive(Args)]
struct NameArgs {
    /// Rule name
    name: String,
}

// An empty value passed to `mod` clears the attribute.
#[derive(Args)]
struct RuleFields {
    /// Description
    #[arg(long)]
    desc: Option<String>,

    /// User category the rule applies to
    #[arg(long)]
    usercat: Option<String>,

    /// Host category the rule applies to
    #[arg(long)]
    hostcat: Option<String>,

    /// Command category the rule applies to
    #[arg(long)]
    cmdcat: Option<String>,
}

impl RuleFields {
    fn into_request(self, request: CommandRequest) -> CommandRequest {
        let mut request = request;
        for (attribute, value) in [
            (ATTR_DESCRIPTION, self.desc),
            (ATTR_USER_CATEGORY, self.usercat),
            (ATTR_HOST_CATEGORY, self.hostcat),
            (ATTR_CMD_CATEGORY, self.cmdcat),
        ] {
            if let Some(value) = value {
                let values: Vec<String> = if value.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![value]
                };
                request = request.with_attribute(attribute, values);
            }
        }
        request
    }
}

#[derive(Args)]
struct RuleFieldArgs {
    /// Rule name
    name: String,

    #[command(flatten)]
    fields: RuleFields,
}

#[derive(Args)]
struct FindArgs {
    /// Text matched against rule names and descriptions
    criteria: Option<String>,

    #[command(flatten)]
    fields: RuleFields,
}

#[derive(Args)]
struct UserMemberArgs {
    /// Rule name
    name: String,

    /// Comma-separated list of users
    #[arg(long, value_delimiter = ',')]
    users: Vec<String>,

    /// Comma-separated list of groups
    #[arg(long, value_delimiter = ',')]
    groups: Vec<String>,
}

#[derive(Args)]
struct HostMemberArgs {
    /// Rule name
    name: String,

    /// Comma-separated list of hosts
    #[arg(long, value_delimiter = ',')]
    hosts: Vec<String>,

    /// Comma-separated list of host groups
    #[arg(long, value_delimiter = ',')]
    hostgroups: Vec<String>,
}

#[derive(Args)]
struct CommandMemberArgs {
    /// Rule name
    name: String,

    /// Comma-separated list of sudo commands
    #[arg(long, value_delimiter = ',')]
    sudocmds: Vec<String>,

    /// Comma-separated list of sudo command groups
    #[arg(long, value_delimiter = ',')]
    sudocmdgroups: Vec<String>,
}

impl Commands {
    /// Registered command and its request.
    fn into_request(self) -> (SudoRuleCommand, CommandRequest) {
        match self {
            Commands::Add(args) => (
                SudoRuleCommand::Add,
                args.fields.into_request(CommandRequest::for_rule(args.name)),
            ),
            Commands::Mod(args) => (
                SudoRuleCommand::Mod,
                args.fields.into_request(CommandRequest::for_rule(args.name)),
            ),
            Commands::Find(args) => (
                SudoRuleCommand::Find,
                args.fields.into_request(CommandRequest::search(args.criteria)),
            ),
            Commands::Del(args) => (SudoRuleCommand::Del, CommandRequest::for_rule(args.name)),
            Commands::Show(args) => (SudoRuleCommand::Show, CommandRequest::for_rule(args.name)),
            Commands::Enable(args) => {
                (SudoRuleCommand::Enable, CommandRequest::for_rule(args.name))
            }
            Commands::Disable(args) => {
                (SudoRuleCommand::Disable, CommandRequest::for_rule(args.name))
            }
            Commands::AddAllowCommand(args) => (SudoRuleCommand::AddAllowCommand, args.request()),
            Commands::RemoveAllowCommand(args) => {
                (SudoRuleCommand::RemoveAllowCommand, args.request())
            }
            Commands::AddDenyCommand(args) => (SudoRuleCommand::AddDenyCommand, args.request()),
            Commands::RemoveDenyCommand(args) => {
                (SudoRuleCommand::RemoveDenyCommand, args.request())
            }
            Commands::AddUser(args) => (SudoRuleCommand::AddUser, args.request()),
            Commands::RemoveUser(args) => (SudoRuleCommand::RemoveUser, args.request()),
            Commands::AddHost(args) => (SudoRuleCommand::AddHost, args.request()),
            Commands::RemoveHost(args) => (SudoRuleCommand::RemoveHost, args.request()),
        }
    }
}

impl UserMemberArgs {
    fn request(self) -> CommandRequest {
        CommandRequest::for_rule(self.name)
            .with_members(MemberKind::User, self.users)
            .with_members(MemberKind::Group, self.groups)
    }
}

impl HostMemberArgs {
    fn request(self) -> CommandRequest {
        CommandRequest::for_rule(self.name)
            .with_members(MemberKind::Host, self.hosts)
            .with_members(MemberKind::HostGroup, self.hostgroups)
    }
}

impl CommandMemberArgs {
    fn request(self) -> CommandRequest {
        CommandRequest::for_rule(self.name)
            .with_members(MemberKind::SudoCmd, self.sudocmds)
            .with_members(MemberKind::SudoCmdGroup, self.sudocmdgroups)
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so --json output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,sudo_rules=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let ldap_config = LdapConfig::from_env()?;
    let engine_config = EngineConfig::from_env().map_err(|e| CliError::Config(e.to_string()))?;
    debug!(config = ?ldap_config, base_dn = %engine_config.base_dn, "Loaded configuration");

    let directory = Arc::new(LdapDirectory::new(ldap_config)?);
    let adapter: Arc<dyn DirectoryAdapter> = directory.clone();
    let controller = Arc::new(SudoRuleController::new(adapter, engine_config));
    let registry = CommandRegistry::with_sudorule_commands(Arc::clone(&controller));

    let (command, request) = cli.command.into_request();
    let result = registry.dispatch(command.name(), request).await;

    if let Err(e) = directory.dispose().await {
        warn!(error = %e, "Failed to close directory connection");
    }

    let response = result?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", output::render(controller.schema(), &response));
    }

    Ok(())
}
