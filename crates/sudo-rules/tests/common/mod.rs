//! Common test utilities for sudo rule tests.
//!
//! Seeds an in-memory directory with the entities rules reference, so the
//! tests run without an LDAP server.

#![allow(dead_code)]

use std::sync::Arc;

use sudo_directory::memory::InMemoryDirectory;
use sudo_directory::operation::Entry;
use sudo_rules::config::EngineConfig;
use sudo_rules::controller::SudoRuleController;
use sudo_rules::dispatch::CommandRegistry;
use sudo_rules::membership::MemberKind;
use sudo_rules::schema::RuleInput;

pub const BASE_DN: &str = "dc=example,dc=com";

/// Test context: the seeded directory plus a controller over it.
pub struct TestContext {
    pub directory: Arc<InMemoryDirectory>,
    pub controller: Arc<SudoRuleController>,
    pub config: EngineConfig,
}

impl TestContext {
    /// Create a context with seeded users, groups, hosts and commands.
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::new(BASE_DN)).await
    }

    /// Create a context with a custom configuration.
    pub async fn with_config(config: EngineConfig) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        seed(&directory, &config).await;

        let controller = Arc::new(SudoRuleController::new(directory.clone(), config.clone()));

        Self {
            directory,
            controller,
            config,
        }
    }

    /// A registry over this context's controller.
    pub fn registry(&self) -> CommandRegistry {
        CommandRegistry::with_sudorule_commands(Arc::clone(&self.controller))
    }
}

/// Build a rule input map from pairs.
pub fn input(pairs: &[(&str, &[&str])]) -> RuleInput {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

async fn seed(directory: &InMemoryDirectory, config: &EngineConfig) {
    let entities: &[(MemberKind, &str, &[&str])] = &[
        (MemberKind::User, "alice", &["top", "person", "posixaccount"]),
        (MemberKind::User, "bob", &["top", "person", "posixaccount"]),
        (MemberKind::Group, "admins", &["top", "groupofnames", "ipausergroup"]),
        (MemberKind::Group, "webteam", &["top", "groupofnames", "ipausergroup"]),
        (MemberKind::Host, "web1.example.com", &["top", "ipahost"]),
        (MemberKind::Host, "web2.example.com", &["top", "ipahost"]),
        (MemberKind::HostGroup, "webservers", &["top", "ipahostgroup"]),
        (MemberKind::SudoCmd, "/usr/bin/less", &["top", "ipasudocmd"]),
        (MemberKind::SudoCmd, "/bin/systemctl", &["top", "ipasudocmd"]),
        (MemberKind::SudoCmd, "/bin/rm", &["top", "ipasudocmd"]),
        (MemberKind::SudoCmdGroup, "editors", &["top", "ipasudocmdgrp"]),
    ];

    for (kind, identifier, classes) in entities {
        let dn = config
            .container_for(*kind)
            .child(kind.key_attribute(), identifier);
        directory
            .insert(
                Entry::new(dn)
                    .with("objectClass", classes.iter().copied())
                    .with(kind.key_attribute(), [*identifier]),
            )
            .await;
    }
}
