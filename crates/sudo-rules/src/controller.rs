//! Sudo rule lifecycle controller
//!
//! Implements the rule operations on top of a [`DirectoryAdapter`]. Each
//! operation re-resolves the rule's DN from its name, validates input with
//! the [`RuleSchema`], and issues at most one write request. Adapter
//! conditions are translated at this boundary:
//!
//! - not-found on the rule becomes [`RuleError::NotFound`]
//! - an entry collision on create becomes [`RuleError::DuplicateKey`]
//! - an empty modification is absorbed and reported as `changed: false`
//!
//! Everything else propagates unchanged as [`RuleError::Directory`].

use std::sync::Arc;

use serde::Serialize;
use sudo_directory::dn::Dn;
use sudo_directory::error::DirectoryError;
use sudo_directory::operation::{AttributeDelta, Entry, Filter};
use sudo_directory::traits::DirectoryAdapter;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, RuleError, ValidationError};
use crate::membership::{MemberOutcome, MemberTargets, MembershipResolver, Relation};
use crate::record::RuleRecord;
use crate::schema::{
    Operation, RuleInput, RuleSchema, ATTR_DESCRIPTION, ATTR_ENABLED, ATTR_NAME, ATTR_UNIQUE_ID,
    DEFAULT_ATTRIBUTES, OBJECT_CLASSES, RULE_OBJECT_CLASS,
};

/// Result of a single-rule operation.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput<T> {
    /// Primary key of the affected rule.
    pub value: String,
    /// Confirmation line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Whether the directory entry changed.
    pub changed: bool,
    pub result: T,
}

/// Result of a search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub count: usize,
    /// Whether more rules matched than the size limit allows.
    pub truncated: bool,
    pub summary: String,
    pub result: Vec<RuleRecord>,
}

/// Result of a member add/remove operation.
#[derive(Debug, Clone, Serialize)]
pub struct MemberOutput {
    pub value: String,
    pub summary: String,
    pub outcome: MemberOutcome,
    /// Whether the directory entry changed.
    pub changed: bool,
    /// The rule after the change.
    pub result: RuleRecord,
}

impl MemberOutput {
    /// Number of identifiers actually added or removed.
    pub fn affected_count(&self) -> usize {
        self.outcome.affected_count()
    }
}

/// Lifecycle controller for sudo rules.
pub struct SudoRuleController {
    directory: Arc<dyn DirectoryAdapter>,
    config: EngineConfig,
    schema: RuleSchema,
    resolver: MembershipResolver,
}

impl SudoRuleController {
    /// Create a controller over `directory`.
    pub fn new(directory: Arc<dyn DirectoryAdapter>, config: EngineConfig) -> Self {
        let resolver = MembershipResolver::new(Arc::clone(&directory), config.clone());
        Self {
            directory,
            config,
            schema: RuleSchema::sudorule(),
            resolver,
        }
    }

    /// The rule schema.
    pub fn schema(&self) -> &RuleSchema {
        &self.schema
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve a rule name to its entry DN.
    ///
    /// The directory matches `cn` case-insensitively; only an entry whose
    /// stored name equals `name` exactly is accepted.
    async fn resolve(&self, name: &str) -> Result<Dn> {
        let filter = Filter::and(vec![
            Filter::eq("objectClass", RULE_OBJECT_CLASS),
            Filter::eq(ATTR_NAME, name),
        ]);
        let entries = self
            .directory
            .search_entries(&self.config.sudorule_base(), &filter, &[ATTR_NAME])
            .await
            .map_err(|e| rule_error(e, name))?;

        entries
            .into_iter()
            .find(|entry| entry.get(ATTR_NAME).iter().any(|value| value == name))
            .map(|entry| entry.dn)
            .ok_or_else(|| RuleError::not_found(name))
    }

    /// Fetch and present a rule by DN.
    async fn load(&self, dn: &Dn, name: &str) -> Result<RuleRecord> {
        let entry = self
            .directory
            .fetch_entry(dn, &DEFAULT_ATTRIBUTES)
            .await
            .map_err(|e| rule_error(e, name))?;
        self.present(&entry).await
    }

    /// Interpret an entry and partition its member relations by kind.
    async fn present(&self, entry: &Entry) -> Result<RuleRecord> {
        let mut record = RuleRecord::from_entry(entry)?;
        for relation in Relation::ALL {
            let values = record.member_dns(relation).to_vec();
            if values.is_empty() {
                continue;
            }
            let partition = self.resolver.partition_by_kind(relation, &values).await?;
            record.apply_partition(relation, partition);
        }
        Ok(record)
    }

    /// Send a delta, absorbing the empty-modification condition.
    ///
    /// Returns whether the entry changed.
    async fn apply(&self, dn: &Dn, name: &str, delta: &AttributeDelta) -> Result<bool> {
        if delta.is_empty() {
            debug!(rule = %name, "Nothing to modify");
            return Ok(false);
        }

        match self.directory.modify_entry(dn, delta).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_empty_modification() => {
                debug!(rule = %name, "No modifications to be performed");
                Ok(false)
            }
            Err(e) => Err(rule_error(e, name)),
        }
    }

    /// Create a rule. It is always created enabled.
    #[instrument(skip(self, attributes))]
    pub async fn create(
        &self,
        name: &str,
        attributes: RuleInput,
    ) -> Result<CommandOutput<RuleRecord>> {
        let mut input = attributes;
        input.retain(|key, _| !key.eq_ignore_ascii_case(ATTR_NAME));
        input.insert(ATTR_NAME.to_string(), vec![name.to_string()]);

        let normalized = self.schema.validate(Operation::Create, &input)?;
        let name = normalized
            .get(ATTR_NAME)
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| ValidationError::Required {
                attribute: ATTR_NAME.to_string(),
            })?;

        match self.resolve(&name).await {
            Ok(_) => return Err(RuleError::DuplicateKey { name }),
            Err(RuleError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let uuid = Uuid::new_v4().to_string();
        let dn = self.config.sudorule_base().child(ATTR_UNIQUE_ID, &uuid);

        let mut entry = Entry::new(dn.clone())
            .with("objectClass", OBJECT_CLASSES)
            .with(ATTR_UNIQUE_ID, [uuid.as_str()]);
        for (attribute, values) in &normalized {
            entry.set(attribute, values.iter().cloned());
        }
        // Sudo rules are enabled by default.
        entry.set(ATTR_ENABLED, ["TRUE"]);

        self.directory
            .create_entry(entry)
            .await
            .map_err(|e| match e {
                DirectoryError::AlreadyExists { .. } => RuleError::DuplicateKey { name: name.clone() },
                other => other.into(),
            })?;

        info!(rule = %name, dn = %dn, "Sudo rule created");

        let record = self.load(&dn, &name).await?;
        Ok(CommandOutput {
            summary: Some(format!("Added sudo rule \"{name}\"")),
            value: name,
            changed: true,
            result: record,
        })
    }

    /// Read a rule.
    #[instrument(skip(self))]
    pub async fn show(&self, name: &str) -> Result<CommandOutput<RuleRecord>> {
        let dn = self.resolve(name).await?;
        let record = self.load(&dn, name).await?;
        Ok(CommandOutput {
            value: name.to_string(),
            summary: None,
            changed: false,
            result: record,
        })
    }

    /// Apply the provided attributes. An empty value list clears an
    /// attribute; a request that changes nothing succeeds as a no-op.
    #[instrument(skip(self, attributes))]
    pub async fn update(
        &self,
        name: &str,
        attributes: RuleInput,
    ) -> Result<CommandOutput<RuleRecord>> {
        let mut attributes = attributes;
        // Restating the rule's own name is not a rename.
        attributes.retain(|key, values| {
            !(key.eq_ignore_ascii_case(ATTR_NAME)
                && values.len() == 1
                && values[0].trim() == name)
        });

        let normalized = self.schema.validate(Operation::Update, &attributes)?;
        let dn = self.resolve(name).await?;

        let mut delta = AttributeDelta::new();
        for (attribute, values) in &normalized {
            if values.is_empty() {
                delta.clear_attribute(attribute.clone());
            } else {
                delta.replace(attribute.clone(), values.iter().cloned());
            }
        }

        let changed = self.apply(&dn, name, &delta).await?;
        if changed {
            info!(rule = %name, attributes = ?delta.affected_attributes(), "Sudo rule modified");
        }

        let record = self.load(&dn, name).await?;
        Ok(CommandOutput {
            value: name.to_string(),
            summary: Some(format!("Modified sudo rule \"{name}\"")),
            changed,
            result: record,
        })
    }

    /// Delete a rule.
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<CommandOutput<bool>> {
        let dn = self.resolve(name).await?;
        self.directory
            .delete_entry(&dn)
            .await
            .map_err(|e| rule_error(e, name))?;

        info!(rule = %name, dn = %dn, "Sudo rule deleted");

        Ok(CommandOutput {
            value: name.to_string(),
            summary: Some(format!("Deleted sudo rule \"{name}\"")),
            changed: true,
            result: true,
        })
    }

    /// Search rules.
    ///
    /// `criteria` matches as a substring of the name or description;
    /// `filters` are equality matches on searchable fields. Zero matches is
    /// an empty result, not an error.
    #[instrument(skip(self, filters))]
    pub async fn find(&self, criteria: Option<&str>, filters: &RuleInput) -> Result<SearchOutput> {
        let normalized = self.schema.validate(Operation::Search, filters)?;

        let mut filter = Filter::eq("objectClass", RULE_OBJECT_CLASS);
        for (attribute, values) in &normalized {
            for value in values {
                filter = filter.and_with(Filter::eq(attribute.clone(), value.clone()));
            }
        }
        if let Some(criteria) = criteria.map(str::trim).filter(|c| !c.is_empty()) {
            filter = filter.and_with(Filter::or(vec![
                Filter::contains(ATTR_NAME, criteria),
                Filter::contains(ATTR_DESCRIPTION, criteria),
            ]));
        }

        let entries = self
            .directory
            .search_entries(&self.config.sudorule_base(), &filter, &DEFAULT_ATTRIBUTES)
            .await?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.present(entry).await {
                Ok(record) => records.push(record),
                Err(RuleError::MalformedEntry { dn, message }) => {
                    warn!(dn = %dn, %message, "Skipping malformed rule entry");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by_key(|record| record.name.to_lowercase());

        let limit = self.config.search_size_limit;
        let truncated = records.len() > limit;
        records.truncate(limit);

        let count = records.len();
        let summary = if count == 1 {
            format!("{count} {} matched", self.schema.object_name)
        } else {
            format!("{count} {} matched", self.schema.object_name_plural)
        };

        debug!(count, truncated, "Sudo rule search completed");

        Ok(SearchOutput {
            count,
            truncated,
            summary,
            result: records,
        })
    }

    /// Enable a rule. Enabling an enabled rule succeeds without change.
    #[instrument(skip(self))]
    pub async fn enable(&self, name: &str) -> Result<CommandOutput<bool>> {
        let changed = self.set_enabled(name, true).await?;
        Ok(CommandOutput {
            value: name.to_string(),
            summary: Some(format!("Enabled Sudo rule \"{name}\"")),
            changed,
            result: true,
        })
    }

    /// Disable a rule. Disabling a disabled rule succeeds without change.
    #[instrument(skip(self))]
    pub async fn disable(&self, name: &str) -> Result<CommandOutput<bool>> {
        let changed = self.set_enabled(name, false).await?;
        Ok(CommandOutput {
            value: name.to_string(),
            summary: Some(format!("Disabled Sudo rule \"{name}\"")),
            changed,
            result: true,
        })
    }

    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<bool> {
        let dn = self.resolve(name).await?;
        let mut delta = AttributeDelta::new();
        delta.replace(ATTR_ENABLED, [if enabled { "TRUE" } else { "FALSE" }]);

        let changed = self.apply(&dn, name, &delta).await?;
        if changed {
            info!(rule = %name, enabled, "Sudo rule state changed");
        }
        Ok(changed)
    }

    /// Add members to a relation in one atomic modification.
    #[instrument(skip(self, targets))]
    pub async fn add_members(
        &self,
        name: &str,
        relation: Relation,
        targets: &MemberTargets,
    ) -> Result<MemberOutput> {
        let dn = self.resolve(name).await?;
        let entry = self
            .directory
            .fetch_entry(&dn, &[relation.attribute()])
            .await
            .map_err(|e| rule_error(e, name))?;

        let plan = self.resolver.plan_add(&entry, relation, targets).await?;
        self.finish_members(&dn, name, plan.delta, plan.outcome).await
    }

    /// Remove members from a relation in one atomic modification.
    #[instrument(skip(self, targets))]
    pub async fn remove_members(
        &self,
        name: &str,
        relation: Relation,
        targets: &MemberTargets,
    ) -> Result<MemberOutput> {
        let dn = self.resolve(name).await?;
        let entry = self
            .directory
            .fetch_entry(&dn, &[relation.attribute()])
            .await
            .map_err(|e| rule_error(e, name))?;

        let plan = self.resolver.plan_remove(&entry, relation, targets);
        self.finish_members(&dn, name, plan.delta, plan.outcome).await
    }

    async fn finish_members(
        &self,
        dn: &Dn,
        name: &str,
        delta: AttributeDelta,
        outcome: MemberOutcome,
    ) -> Result<MemberOutput> {
        let changed = self.apply(dn, name, &delta).await?;
        if !changed && outcome.affected_count() > 0 {
            // The entry changed between read and write.
            warn!(rule = %name, relation = %outcome.relation, "Planned member change was already applied");
        }

        info!(
            rule = %name,
            relation = %outcome.relation,
            completed = outcome.affected_count(),
            failed = outcome.failed.len(),
            "Sudo rule members updated"
        );

        let record = self.load(dn, name).await?;
        Ok(MemberOutput {
            value: name.to_string(),
            summary: outcome.summary(),
            outcome,
            changed,
            result: record,
        })
    }

    /// Add commands and command groups to the allowed commands.
    pub async fn add_allow_command(&self, name: &str, targets: &MemberTargets) -> Result<MemberOutput> {
        self.add_members(name, Relation::MemberAllowCmd, targets).await
    }

    /// Remove commands and command groups from the allowed commands.
    pub async fn remove_allow_command(
        &self,
        name: &str,
        targets: &MemberTargets,
    ) -> Result<MemberOutput> {
        self.remove_members(name, Relation::MemberAllowCmd, targets).await
    }

    /// Add commands and command groups to the denied commands.
    pub async fn add_deny_command(&self, name: &str, targets: &MemberTargets) -> Result<MemberOutput> {
        self.add_members(name, Relation::MemberDenyCmd, targets).await
    }

    /// Remove commands and command groups from the denied commands.
    pub async fn remove_deny_command(
        &self,
        name: &str,
        targets: &MemberTargets,
    ) -> Result<MemberOutput> {
        self.remove_members(name, Relation::MemberDenyCmd, targets).await
    }

    /// Add users and groups.
    pub async fn add_user(&self, name: &str, targets: &MemberTargets) -> Result<MemberOutput> {
        self.add_members(name, Relation::MemberUser, targets).await
    }

    /// Remove users and groups.
    pub async fn remove_user(&self, name: &str, targets: &MemberTargets) -> Result<MemberOutput> {
        self.remove_members(name, Relation::MemberUser, targets).await
    }

    /// Add hosts and host groups.
    pub async fn add_host(&self, name: &str, targets: &MemberTargets) -> Result<MemberOutput> {
        self.add_members(name, Relation::MemberHost, targets).await
    }

    /// Remove hosts and host groups.
    pub async fn remove_host(&self, name: &str, targets: &MemberTargets) -> Result<MemberOutput> {
        self.remove_members(name, Relation::MemberHost, targets).await
    }
}

/// Map an adapter error on the rule's own entry.
fn rule_error(error: DirectoryError, name: &str) -> RuleError {
    if error.is_not_found() {
        RuleError::not_found(name)
    } else {
        RuleError::Directory(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::MemberKind;
    use sudo_directory::memory::InMemoryDirectory;

    fn controller() -> (Arc<InMemoryDirectory>, SudoRuleController) {
        let dir = Arc::new(InMemoryDirectory::new());
        let controller =
            SudoRuleController::new(dir.clone(), EngineConfig::new("dc=example,dc=com"));
        (dir, controller)
    }

    #[tokio::test]
    async fn test_create_writes_identity_and_classes() {
        let (dir, controller) = controller();
        let output = controller.create("webadmins", RuleInput::new()).await.unwrap();

        let stored = dir.get(&output.result.dn).await.unwrap();
        assert!(stored.has_value("objectClass", "ipasudorule"));
        assert!(stored.has_value("objectClass", "ipaassociation"));
        assert_eq!(stored.first("ipaEnabledFlag"), Some("TRUE"));
        assert_eq!(
            stored.dn.first_rdn().map(|(attr, _)| attr),
            Some("ipaUniqueID".to_string())
        );
        assert_eq!(output.result.uuid, stored.first("ipaUniqueID").map(str::to_string));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input_before_writing() {
        let (dir, controller) = controller();
        let mut input = RuleInput::new();
        input.insert("userCategory".into(), vec!["everyone".into()]);

        let err = controller.create("webadmins", input).await.unwrap_err();
        assert!(matches!(err, RuleError::Validation(_)));
        assert!(dir.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_clears_attribute() {
        let (_dir, controller) = controller();
        let mut input = RuleInput::new();
        input.insert("description".into(), vec!["web team".into()]);
        controller.create("webadmins", input).await.unwrap();

        let mut clear = RuleInput::new();
        clear.insert("description".into(), Vec::new());
        let output = controller.update("webadmins", clear).await.unwrap();
        assert!(output.changed);
        assert!(output.result.description.is_none());
    }

    #[tokio::test]
    async fn test_member_change_applied_concurrently_is_unchanged() {
        let (dir, controller) = controller();
        let alice = controller
            .config
            .container_for(MemberKind::User)
            .child("uid", "alice");
        dir.insert(
            Entry::new(alice)
                .with("objectClass", ["top", "posixaccount"])
                .with("uid", ["alice"]),
        )
        .await;
        let dn = controller.create("ops", RuleInput::new()).await.unwrap().result.dn;

        let entry = dir.fetch_entry(&dn, &["memberUser"]).await.unwrap();
        let targets = MemberTargets::new().with(MemberKind::User, ["alice"]);
        let plan = controller
            .resolver
            .plan_add(&entry, Relation::MemberUser, &targets)
            .await
            .unwrap();

        // Another writer lands the same change first.
        dir.modify_entry(&dn, &plan.delta).await.unwrap();

        let output = controller
            .finish_members(&dn, "ops", plan.delta, plan.outcome)
            .await
            .unwrap();
        assert_eq!(output.affected_count(), 1);
        assert!(!output.changed);
        assert_eq!(output.result.member_dns(Relation::MemberUser).len(), 1);
    }

    #[tokio::test]
    async fn test_show_missing_rule() {
        let (_dir, controller) = controller();
        let err = controller.show("nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "nope: Sudo Rule not found");
    }
}
