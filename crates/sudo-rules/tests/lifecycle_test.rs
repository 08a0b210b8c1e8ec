//! Integration tests for the sudo rule lifecycle.
//!
//! Runs the controller and command registry against a seeded in-memory
//! directory, covering create/show/update/delete/find, the enabled state
//! machine and the eight member operations.

mod common;

use common::{input, TestContext};
use sudo_directory::traits::DirectoryAdapter;
use sudo_rules::config::EngineConfig;
use sudo_rules::dispatch::{CommandRequest, SudoRuleCommand};
use sudo_rules::error::{RuleError, ValidationError};
use sudo_rules::membership::{FailureReason, MemberKind, MemberTargets, Relation};
use sudo_rules::record::Category;
use sudo_rules::schema::RuleInput;

fn users(ids: &[&str]) -> MemberTargets {
    MemberTargets::new().with(MemberKind::User, ids.iter().copied())
}

// =============================================================================
// Scenario
// =============================================================================

#[tokio::test]
async fn test_webadmins_scenario() {
    let ctx = TestContext::new().await;
    let c = &ctx.controller;

    let created = c.create("webadmins", RuleInput::new()).await.unwrap();
    assert!(created.result.enabled);

    let disabled = c.disable("webadmins").await.unwrap();
    assert!(disabled.changed);
    assert!(!c.show("webadmins").await.unwrap().result.enabled);

    let again = c.disable("webadmins").await.unwrap();
    assert!(!again.changed);
    assert!(!c.show("webadmins").await.unwrap().result.enabled);

    let added = c.add_user("webadmins", &users(&["alice"])).await.unwrap();
    assert_eq!(added.affected_count(), 1);

    let repeated = c.add_user("webadmins", &users(&["alice"])).await.unwrap();
    assert_eq!(repeated.affected_count(), 0);
    assert_eq!(repeated.outcome.already_present(), vec!["alice"]);

    let deleted = c.delete("webadmins").await.unwrap();
    assert_eq!(deleted.summary.as_deref(), Some("Deleted sudo rule \"webadmins\""));

    let err = c.show("webadmins").await.unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Create / Show
// =============================================================================

#[tokio::test]
async fn test_create_forces_enabled() {
    let ctx = TestContext::new().await;
    let output = ctx
        .controller
        .create("ops", input(&[("ipaEnabledFlag", &["FALSE"])]))
        .await
        .unwrap();

    assert!(output.result.enabled);
    assert_eq!(output.summary.as_deref(), Some("Added sudo rule \"ops\""));
}

#[tokio::test]
async fn test_create_duplicate_name() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let err = ctx
        .controller
        .create("ops", input(&[("description", &["second"])]))
        .await
        .unwrap_err();
    assert!(matches!(err, RuleError::DuplicateKey { ref name } if name == "ops"));
    assert_eq!(err.to_string(), "Sudo Rule with name \"ops\" already exists");
}

#[tokio::test]
async fn test_names_differing_in_case_are_distinct_rules() {
    let ctx = TestContext::new().await;
    let c = &ctx.controller;
    c.create("webadmins", input(&[("description", &["lower"])]))
        .await
        .unwrap();
    c.create("WebAdmins", input(&[("description", &["mixed"])]))
        .await
        .unwrap();

    let lower = c.show("webadmins").await.unwrap().result;
    let mixed = c.show("WebAdmins").await.unwrap().result;
    assert_eq!(lower.name, "webadmins");
    assert_eq!(lower.description.as_deref(), Some("lower"));
    assert_eq!(mixed.name, "WebAdmins");
    assert_eq!(mixed.description.as_deref(), Some("mixed"));
    assert_ne!(lower.dn, mixed.dn);

    let err = c.show("WEBADMINS").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "WEBADMINS: Sudo Rule not found");

    c.delete("WebAdmins").await.unwrap();
    assert!(c.show("WebAdmins").await.unwrap_err().is_not_found());
    assert_eq!(c.show("webadmins").await.unwrap().result.name, "webadmins");
    assert_eq!(c.find(None, &RuleInput::new()).await.unwrap().count, 1);
}

#[tokio::test]
async fn test_create_with_categories() {
    let ctx = TestContext::new().await;
    let output = ctx
        .controller
        .create(
            "everything",
            input(&[
                ("description", &["all users, all hosts"]),
                ("usercategory", &["ALL"]),
                ("hostCategory", &["all"]),
            ]),
        )
        .await
        .unwrap();

    let record = output.result;
    assert_eq!(record.user_category, Some(Category::All));
    assert_eq!(record.host_category, Some(Category::All));
    assert_eq!(record.cmd_category, None);
    assert!(record.is_categorical(Relation::MemberUser));
    assert!(!record.is_categorical(Relation::MemberAllowCmd));
    assert_eq!(record.description.as_deref(), Some("all users, all hosts"));
}

#[tokio::test]
async fn test_create_rejects_invalid_input() {
    let ctx = TestContext::new().await;

    let err = ctx
        .controller
        .create("bad", input(&[("cmdcategory", &["some"])]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuleError::Validation(ValidationError::InvalidValue { .. })
    ));

    let err = ctx
        .controller
        .create("bad", input(&[("sudoRunAsUser", &["root"])]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuleError::Validation(ValidationError::UnknownAttribute { .. })
    ));

    let err = ctx.controller.create("  ", RuleInput::new()).await.unwrap_err();
    assert!(matches!(err, RuleError::Validation(ValidationError::Empty { .. })));

    assert!(ctx.controller.find(None, &RuleInput::new()).await.unwrap().result.is_empty());
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_identical_payload_is_noop() {
    let ctx = TestContext::new().await;
    ctx.controller
        .create("ops", input(&[("description", &["ops team"])]))
        .await
        .unwrap();

    let output = ctx
        .controller
        .update("ops", input(&[("description", &["ops team"])]))
        .await
        .unwrap();
    assert!(!output.changed);
    assert_eq!(output.result.description.as_deref(), Some("ops team"));
}

#[tokio::test]
async fn test_update_restating_own_name_is_noop() {
    let ctx = TestContext::new().await;
    ctx.controller
        .create("ops", input(&[("description", &["x"])]))
        .await
        .unwrap();

    let output = ctx
        .controller
        .update("ops", input(&[("cn", &["ops"]), ("description", &["x"])]))
        .await
        .unwrap();
    assert!(!output.changed);
    assert_eq!(output.result.name, "ops");

    // A different case is a different name.
    let err = ctx
        .controller
        .update("ops", input(&[("CN", &["OPS"])]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuleError::Validation(ValidationError::NotPermitted { .. })
    ));
}

#[tokio::test]
async fn test_update_changes_and_clears() {
    let ctx = TestContext::new().await;
    ctx.controller
        .create("ops", input(&[("description", &["ops team"])]))
        .await
        .unwrap();

    let output = ctx
        .controller
        .update(
            "ops",
            input(&[("description", &[]), ("cmdCategory", &["all"])]),
        )
        .await
        .unwrap();
    assert!(output.changed);
    assert_eq!(output.summary.as_deref(), Some("Modified sudo rule \"ops\""));
    assert!(output.result.description.is_none());
    assert_eq!(output.result.cmd_category, Some(Category::All));
}

#[tokio::test]
async fn test_update_cannot_rename_or_enable() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();
    ctx.controller.disable("ops").await.unwrap();

    let err = ctx
        .controller
        .update("ops", input(&[("cn", &["renamed"])]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RuleError::Validation(ValidationError::NotPermitted { .. })
    ));

    let output = ctx
        .controller
        .update("ops", input(&[("ipaEnabledFlag", &["TRUE"])]))
        .await
        .unwrap();
    assert!(!output.changed);
    assert!(!output.result.enabled);
}

// =============================================================================
// Enable / Disable
// =============================================================================

#[tokio::test]
async fn test_enable_transitions() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let noop = ctx.controller.enable("ops").await.unwrap();
    assert!(!noop.changed);
    assert_eq!(noop.summary.as_deref(), Some("Enabled Sudo rule \"ops\""));

    ctx.controller.disable("ops").await.unwrap();
    let enabled = ctx.controller.enable("ops").await.unwrap();
    assert!(enabled.changed);
    assert!(ctx.controller.show("ops").await.unwrap().result.enabled);
}

// =============================================================================
// Not found
// =============================================================================

#[tokio::test]
async fn test_missing_rule_is_not_found_everywhere() {
    let ctx = TestContext::new().await;
    let c = &ctx.controller;
    let targets = users(&["alice"]);
    let empty = MemberTargets::new();

    let results = vec![
        c.show("ghost").await.map(|_| ()),
        c.update("ghost", input(&[("description", &["x"])])).await.map(|_| ()),
        c.delete("ghost").await.map(|_| ()),
        c.enable("ghost").await.map(|_| ()),
        c.disable("ghost").await.map(|_| ()),
        c.add_user("ghost", &targets).await.map(|_| ()),
        c.remove_user("ghost", &targets).await.map(|_| ()),
        c.add_host("ghost", &empty).await.map(|_| ()),
        c.remove_host("ghost", &empty).await.map(|_| ()),
        c.add_allow_command("ghost", &empty).await.map(|_| ()),
        c.remove_allow_command("ghost", &empty).await.map(|_| ()),
        c.add_deny_command("ghost", &empty).await.map(|_| ()),
        c.remove_deny_command("ghost", &empty).await.map(|_| ()),
    ];

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_not_found(), "expected NotFound, got {err:?}");
        assert_eq!(err.to_string(), "ghost: Sudo Rule not found");
    }
}

#[tokio::test]
async fn test_deleted_rule_cannot_be_deleted_again() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();
    ctx.controller.delete("ops").await.unwrap();

    assert!(ctx.controller.delete("ops").await.unwrap_err().is_not_found());
    // Only the seeded entities remain.
    assert_eq!(ctx.directory.len().await, 11);
}

// =============================================================================
// Members
// =============================================================================

#[tokio::test]
async fn test_add_users_and_groups_in_one_call() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let targets = MemberTargets::new()
        .with(MemberKind::User, ["alice", "bob", "mallory"])
        .with(MemberKind::Group, ["admins"]);
    let output = ctx.controller.add_user("ops", &targets).await.unwrap();

    assert_eq!(output.affected_count(), 3);
    assert_eq!(output.summary, "3 objects added.");
    assert_eq!(output.outcome.unresolved(), vec!["mallory"]);
    assert_eq!(output.outcome.failed[0].reason, FailureReason::NoSuchEntry);
    assert_eq!(output.outcome.failed[0].reason.to_string(), "no such entry");

    let record = output.result;
    assert_eq!(
        record.members_of(Relation::MemberUser, MemberKind::User),
        ["alice".to_string(), "bob".to_string()]
    );
    assert_eq!(
        record.members_of(Relation::MemberUser, MemberKind::Group),
        ["admins".to_string()]
    );
    assert_eq!(record.member_dns(Relation::MemberUser).len(), 3);
}

#[tokio::test]
async fn test_add_member_twice_is_idempotent() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let hosts = MemberTargets::new().with(MemberKind::Host, ["web1.example.com"]);
    ctx.controller.add_host("ops", &hosts).await.unwrap();
    let second = ctx.controller.add_host("ops", &hosts).await.unwrap();

    assert_eq!(second.affected_count(), 0);
    assert_eq!(second.summary, "0 objects added.");
    assert_eq!(second.outcome.already_present(), vec!["web1.example.com"]);
    assert_eq!(
        second.outcome.failed[0].reason.to_string(),
        "This entry is already a member"
    );
    assert_eq!(second.result.member_dns(Relation::MemberHost).len(), 1);
}

#[tokio::test]
async fn test_remove_non_member_does_not_mutate() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();
    ctx.controller
        .add_user("ops", &users(&["alice"]))
        .await
        .unwrap();

    let output = ctx
        .controller
        .remove_user("ops", &users(&["bob"]))
        .await
        .unwrap();
    assert_eq!(output.affected_count(), 0);
    assert_eq!(output.outcome.not_present(), vec!["bob"]);
    assert_eq!(
        output.outcome.failed[0].reason.to_string(),
        "This entry is not a member"
    );
    assert_eq!(
        output.result.members_of(Relation::MemberUser, MemberKind::User),
        ["alice".to_string()]
    );

    let removed = ctx
        .controller
        .remove_user("ops", &users(&["alice"]))
        .await
        .unwrap();
    assert_eq!(removed.summary, "1 object removed.");
    assert!(removed.result.member_dns(Relation::MemberUser).is_empty());
}

#[tokio::test]
async fn test_allow_and_deny_commands_are_separate() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let allow = MemberTargets::new()
        .with(MemberKind::SudoCmd, ["/usr/bin/less", "/bin/systemctl"])
        .with(MemberKind::SudoCmdGroup, ["editors"]);
    let deny = MemberTargets::new().with(MemberKind::SudoCmd, ["/bin/rm"]);

    ctx.controller.add_allow_command("ops", &allow).await.unwrap();
    let output = ctx.controller.add_deny_command("ops", &deny).await.unwrap();

    let record = output.result;
    assert_eq!(
        record.members_of(Relation::MemberAllowCmd, MemberKind::SudoCmd),
        ["/bin/systemctl".to_string(), "/usr/bin/less".to_string()]
    );
    assert_eq!(
        record.members_of(Relation::MemberAllowCmd, MemberKind::SudoCmdGroup),
        ["editors".to_string()]
    );
    assert_eq!(
        record.members_of(Relation::MemberDenyCmd, MemberKind::SudoCmd),
        ["/bin/rm".to_string()]
    );

    let output = ctx
        .controller
        .remove_deny_command("ops", &deny)
        .await
        .unwrap();
    assert_eq!(output.affected_count(), 1);
    assert!(output.result.member_dns(Relation::MemberDenyCmd).is_empty());

    let output = ctx
        .controller
        .remove_allow_command(
            "ops",
            &MemberTargets::new().with(MemberKind::SudoCmdGroup, ["editors"]),
        )
        .await
        .unwrap();
    assert_eq!(output.affected_count(), 1);
    assert_eq!(output.result.member_dns(Relation::MemberAllowCmd).len(), 2);
}

#[tokio::test]
async fn test_wrong_kind_for_relation_is_reported() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let output = ctx
        .controller
        .add_host(
            "ops",
            &MemberTargets::new()
                .with(MemberKind::HostGroup, ["webservers"])
                .with(MemberKind::User, ["alice"]),
        )
        .await
        .unwrap();

    assert_eq!(output.affected_count(), 1);
    assert_eq!(output.outcome.failed.len(), 1);
    assert_eq!(output.outcome.failed[0].reason, FailureReason::KindNotAccepted);
    assert_eq!(
        output.result.members_of(Relation::MemberHost, MemberKind::HostGroup),
        ["webservers".to_string()]
    );
}

#[tokio::test]
async fn test_empty_member_request_is_noop() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();

    let output = ctx
        .controller
        .add_user("ops", &MemberTargets::new())
        .await
        .unwrap();
    assert_eq!(output.affected_count(), 0);
    assert!(output.outcome.failed.is_empty());
}

#[tokio::test]
async fn test_categorical_and_explicit_members_coexist() {
    let ctx = TestContext::new().await;
    ctx.controller
        .create("ops", input(&[("userCategory", &["all"])]))
        .await
        .unwrap();

    let output = ctx
        .controller
        .add_user("ops", &users(&["alice"]))
        .await
        .unwrap();
    assert_eq!(output.affected_count(), 1);
    assert!(output.result.is_categorical(Relation::MemberUser));
    assert_eq!(output.result.member_dns(Relation::MemberUser).len(), 1);
}

#[tokio::test]
async fn test_dangling_member_reported_as_unresolved() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();
    ctx.controller
        .add_user("ops", &users(&["bob"]))
        .await
        .unwrap();

    // Removing the user entry leaves the reference behind.
    let bob = ctx
        .config
        .container_for(MemberKind::User)
        .child("uid", "bob");
    ctx.directory.delete_entry(&bob).await.unwrap();

    let record = ctx.controller.show("ops").await.unwrap().result;
    assert!(record.members_of(Relation::MemberUser, MemberKind::User).is_empty());
    assert_eq!(record.unresolved_members, vec![bob.to_string()]);
    assert_eq!(record.member_dns(Relation::MemberUser).len(), 1);
}

// =============================================================================
// Find
// =============================================================================

#[tokio::test]
async fn test_find_criteria_and_filters() {
    let ctx = TestContext::new().await;
    let c = &ctx.controller;
    c.create("webadmins", input(&[("description", &["web team"])]))
        .await
        .unwrap();
    c.create("dbadmins", input(&[("description", &["database team"]), ("hostcategory", &["all"])]))
        .await
        .unwrap();
    c.create("backup", input(&[("description", &["nightly jobs"])]))
        .await
        .unwrap();

    let all = c.find(None, &RuleInput::new()).await.unwrap();
    assert_eq!(all.count, 3);
    assert_eq!(all.summary, "3 Sudo Rules matched");
    let names: Vec<_> = all.result.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["backup", "dbadmins", "webadmins"]);

    let team = c.find(Some("team"), &RuleInput::new()).await.unwrap();
    assert_eq!(team.count, 2);

    let filtered = c
        .find(Some("team"), &input(&[("hostCategory", &["ALL"])]))
        .await
        .unwrap();
    assert_eq!(filtered.count, 1);
    assert_eq!(filtered.summary, "1 Sudo Rule matched");
    assert_eq!(filtered.result[0].name, "dbadmins");

    let none = c.find(Some("nothing-like-this"), &RuleInput::new()).await.unwrap();
    assert_eq!(none.count, 0);
    assert_eq!(none.summary, "0 Sudo Rules matched");
}

#[tokio::test]
async fn test_find_respects_size_limit() {
    let ctx =
        TestContext::with_config(EngineConfig::new(common::BASE_DN).with_search_size_limit(2)).await;
    for name in ["a", "b", "c"] {
        ctx.controller.create(name, RuleInput::new()).await.unwrap();
    }

    let output = ctx.controller.find(None, &RuleInput::new()).await.unwrap();
    assert_eq!(output.count, 2);
    assert!(output.truncated);
}

#[tokio::test]
async fn test_find_ignores_enabled_filter() {
    let ctx = TestContext::new().await;
    ctx.controller.create("ops", RuleInput::new()).await.unwrap();
    ctx.controller.disable("ops").await.unwrap();

    let output = ctx
        .controller
        .find(None, &input(&[("ipaEnabledFlag", &["TRUE"])]))
        .await
        .unwrap();
    assert_eq!(output.count, 1);
}

// =============================================================================
// Command registry
// =============================================================================

#[tokio::test]
async fn test_registry_member_command_response() {
    let ctx = TestContext::new().await;
    let registry = ctx.registry();

    registry
        .dispatch(
            SudoRuleCommand::Add.name(),
            CommandRequest::for_rule("webadmins"),
        )
        .await
        .unwrap();

    let response = registry
        .dispatch(
            "sudorule-add-user",
            CommandRequest::for_rule("webadmins")
                .with_members(MemberKind::User, ["alice", "nobody"]),
        )
        .await
        .unwrap();

    assert!(response.success);
    assert!(response.changed);
    assert_eq!(response.affected_count, Some(1));
    assert_eq!(response.summary.as_deref(), Some("1 object added."));
    assert_eq!(response.failed.len(), 1);
    assert_eq!(response.result["members"]["memberuser_user"][0], "alice");

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["failed"][0]["reason"], "no_such_entry");

    let repeated = registry
        .dispatch(
            "sudorule-add-user",
            CommandRequest::for_rule("webadmins").with_members(MemberKind::User, ["alice"]),
        )
        .await
        .unwrap();
    assert!(!repeated.changed);
    assert_eq!(repeated.affected_count, Some(0));
}

#[tokio::test]
async fn test_registry_enable_disable() {
    let ctx = TestContext::new().await;
    let registry = ctx.registry();
    registry
        .dispatch("sudorule-add", CommandRequest::for_rule("ops"))
        .await
        .unwrap();

    let disabled = registry
        .dispatch("sudorule-disable", CommandRequest::for_rule("ops"))
        .await
        .unwrap();
    assert!(disabled.changed);
    assert_eq!(disabled.summary.as_deref(), Some("Disabled Sudo rule \"ops\""));
    assert_eq!(disabled.result, serde_json::Value::Bool(true));

    let err = registry
        .dispatch("sudorule-enable", CommandRequest::for_rule("missing"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_operations_on_different_rules() {
    let ctx = TestContext::new().await;
    ctx.controller.create("one", RuleInput::new()).await.unwrap();
    ctx.controller.create("two", RuleInput::new()).await.unwrap();

    let first = ctx.controller.clone();
    let second = ctx.controller.clone();
    let (a, b) = tokio::join!(
        async move { first.add_user("one", &users(&["alice", "bob"])).await },
        async move { second.disable("two").await },
    );

    assert_eq!(a.unwrap().affected_count(), 2);
    assert!(b.unwrap().changed);
    assert!(ctx.controller.show("one").await.unwrap().result.enabled);
    assert!(!ctx.controller.show("two").await.unwrap().result.enabled);
}
