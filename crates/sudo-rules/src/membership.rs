//! Membership resolution
//!
//! A rule links to other directory entities through four relations, each a
//! single multi-valued attribute of member DNs. A relation may reference
//! more than one kind of entity (users and groups, hosts and host groups,
//! commands and command groups). The kind is not stored; the resolver
//! derives it from the referenced entry and plans kind-scoped additions and
//! removals as one [`AttributeDelta`] per request.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sudo_directory::dn::Dn;
use sudo_directory::error::DirectoryResult;
use sudo_directory::operation::{AttributeDelta, Entry};
use sudo_directory::traits::DirectoryAdapter;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::ValidationError;

/// Kind of entity a rule can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    User,
    Group,
    Host,
    HostGroup,
    SudoCmd,
    SudoCmdGroup,
}

impl MemberKind {
    /// All kinds.
    pub const ALL: [MemberKind; 6] = [
        MemberKind::User,
        MemberKind::Group,
        MemberKind::Host,
        MemberKind::HostGroup,
        MemberKind::SudoCmd,
        MemberKind::SudoCmdGroup,
    ];

    /// Short name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            MemberKind::User => "user",
            MemberKind::Group => "group",
            MemberKind::Host => "host",
            MemberKind::HostGroup => "hostgroup",
            MemberKind::SudoCmd => "sudocmd",
            MemberKind::SudoCmdGroup => "sudocmdgroup",
        }
    }

    /// Attribute holding the entity's identifier (also its RDN attribute).
    pub fn key_attribute(self) -> &'static str {
        match self {
            MemberKind::User => "uid",
            MemberKind::Host => "fqdn",
            MemberKind::SudoCmd => "sudoCmd",
            MemberKind::Group | MemberKind::HostGroup | MemberKind::SudoCmdGroup => "cn",
        }
    }

    /// Object class that marks entries of this kind.
    pub fn object_class(self) -> &'static str {
        match self {
            MemberKind::User => "posixaccount",
            MemberKind::Group => "ipausergroup",
            MemberKind::Host => "ipahost",
            MemberKind::HostGroup => "ipahostgroup",
            MemberKind::SudoCmd => "ipasudocmd",
            MemberKind::SudoCmdGroup => "ipasudocmdgrp",
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MemberKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemberKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidValue {
                attribute: "kind".to_string(),
                value: s.to_string(),
                allowed: MemberKind::ALL
                    .iter()
                    .map(|k| format!("'{k}'"))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// A membership relation of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    MemberUser,
    MemberHost,
    MemberAllowCmd,
    MemberDenyCmd,
}

impl Relation {
    /// All relations.
    pub const ALL: [Relation; 4] = [
        Relation::MemberUser,
        Relation::MemberHost,
        Relation::MemberAllowCmd,
        Relation::MemberDenyCmd,
    ];

    /// Attribute storing the relation's member DNs.
    pub fn attribute(self) -> &'static str {
        match self {
            Relation::MemberUser => "memberUser",
            Relation::MemberHost => "memberHost",
            Relation::MemberAllowCmd => "memberAllowCmd",
            Relation::MemberDenyCmd => "memberDenyCmd",
        }
    }

    /// Kinds the relation may reference.
    pub fn kinds(self) -> &'static [MemberKind] {
        match self {
            Relation::MemberUser => &[MemberKind::User, MemberKind::Group],
            Relation::MemberHost => &[MemberKind::Host, MemberKind::HostGroup],
            Relation::MemberAllowCmd | Relation::MemberDenyCmd => {
                &[MemberKind::SudoCmd, MemberKind::SudoCmdGroup]
            }
        }
    }

    /// Check if the relation may reference `kind`.
    pub fn accepts(self, kind: MemberKind) -> bool {
        self.kinds().contains(&kind)
    }

    /// Read-side parameter name for one kind, e.g. `memberuser_group`.
    pub fn view_param(self, kind: MemberKind) -> String {
        format!("{}_{}", self.attribute().to_lowercase(), kind.name())
    }

    /// Display label of the read-side parameter for one kind.
    pub fn view_label(self, kind: MemberKind) -> &'static str {
        match (self, kind) {
            (Relation::MemberUser, MemberKind::User) => "Users",
            (Relation::MemberUser, _) => "Groups",
            (Relation::MemberHost, MemberKind::Host) => "Hosts",
            (Relation::MemberHost, _) => "Host Groups",
            (Relation::MemberAllowCmd, MemberKind::SudoCmd) => "Sudo Allow Commands",
            (Relation::MemberAllowCmd, _) => "Sudo Allow Command Groups",
            (Relation::MemberDenyCmd, MemberKind::SudoCmd) => "Sudo Deny Commands",
            (Relation::MemberDenyCmd, _) => "Sudo Deny Command Groups",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attribute())
    }
}

/// Identifiers requested per member kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberTargets {
    targets: BTreeMap<MemberKind, Vec<String>>,
}

impl MemberTargets {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers of one kind using builder pattern.
    #[must_use]
    pub fn with<I, S>(mut self, kind: MemberKind, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(kind, identifiers);
        self
    }

    /// Add identifiers of one kind.
    pub fn extend<I, S>(&mut self, kind: MemberKind, identifiers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets
            .entry(kind)
            .or_default()
            .extend(identifiers.into_iter().map(Into::into));
    }

    /// Identifiers requested for `kind`.
    pub fn get(&self, kind: MemberKind) -> &[String] {
        self.targets.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterate over requested kinds and their identifiers.
    pub fn iter(&self) -> impl Iterator<Item = (MemberKind, &[String])> {
        self.targets.iter().map(|(kind, ids)| (*kind, ids.as_slice()))
    }

    /// Total number of identifiers.
    pub fn len(&self) -> usize {
        self.targets.values().map(Vec::len).sum()
    }

    /// Check if no identifiers were requested.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Direction of a member operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberAction {
    Add,
    Remove,
}

/// Why one identifier was not changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No entity of the requested kind has this identifier.
    NoSuchEntry,
    /// Already referenced by the relation.
    AlreadyMember,
    /// Not referenced by the relation.
    NotMember,
    /// The relation does not reference entities of this kind.
    KindNotAccepted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoSuchEntry => write!(f, "no such entry"),
            FailureReason::AlreadyMember => write!(f, "This entry is already a member"),
            FailureReason::NotMember => write!(f, "This entry is not a member"),
            FailureReason::KindNotAccepted => write!(f, "not a valid member type"),
        }
    }
}

/// One identifier that was not changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFailure {
    pub kind: MemberKind,
    pub identifier: String,
    pub reason: FailureReason,
}

/// Per-identifier result of a member add/remove request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberOutcome {
    pub relation: Relation,
    pub action: MemberAction,
    /// Identifiers actually added or removed, per kind.
    pub completed: BTreeMap<MemberKind, Vec<String>>,
    /// Identifiers left unchanged, with the reason.
    pub failed: Vec<MemberFailure>,
}

impl MemberOutcome {
    /// Create an empty outcome.
    pub fn new(relation: Relation, action: MemberAction) -> Self {
        Self {
            relation,
            action,
            completed: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    fn complete(&mut self, kind: MemberKind, identifier: &str) {
        self.completed
            .entry(kind)
            .or_default()
            .push(identifier.to_string());
    }

    fn fail(&mut self, kind: MemberKind, identifier: &str, reason: FailureReason) {
        debug!(%kind, identifier, %reason, "Member left unchanged");
        self.failed.push(MemberFailure {
            kind,
            identifier: identifier.to_string(),
            reason,
        });
    }

    /// Number of identifiers actually changed.
    pub fn affected_count(&self) -> usize {
        self.completed.values().map(Vec::len).sum()
    }

    /// Identifiers that failed for `reason`.
    pub fn failed_with(&self, reason: FailureReason) -> Vec<&str> {
        self.failed
            .iter()
            .filter(|f| f.reason == reason)
            .map(|f| f.identifier.as_str())
            .collect()
    }

    /// Identifiers already present (add).
    pub fn already_present(&self) -> Vec<&str> {
        self.failed_with(FailureReason::AlreadyMember)
    }

    /// Identifiers that were not members (remove).
    pub fn not_present(&self) -> Vec<&str> {
        self.failed_with(FailureReason::NotMember)
    }

    /// Identifiers that did not resolve to an entity of the requested kind.
    pub fn unresolved(&self) -> Vec<&str> {
        self.failed
            .iter()
            .filter(|f| {
                matches!(
                    f.reason,
                    FailureReason::NoSuchEntry | FailureReason::KindNotAccepted
                )
            })
            .map(|f| f.identifier.as_str())
            .collect()
    }

    /// Confirmation line, e.g. `2 objects added.`
    pub fn summary(&self) -> String {
        let count = self.affected_count();
        let verb = match self.action {
            MemberAction::Add => "added",
            MemberAction::Remove => "removed",
        };
        if count == 1 {
            format!("{count} object {verb}.")
        } else {
            format!("{count} objects {verb}.")
        }
    }
}

/// A planned member change: the delta to send and the per-item outcome.
#[derive(Debug, Clone)]
pub struct MemberPlan {
    pub delta: AttributeDelta,
    pub outcome: MemberOutcome,
}

/// A relation's stored DNs split by referenced kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Identifiers per kind, sorted.
    pub by_kind: BTreeMap<MemberKind, Vec<String>>,
    /// Stored DNs whose kind could not be determined.
    pub unclassified: Vec<String>,
}

/// Resolves member identifiers against the directory.
pub struct MembershipResolver {
    directory: Arc<dyn DirectoryAdapter>,
    config: EngineConfig,
}

impl MembershipResolver {
    /// Create a resolver over `directory`.
    pub fn new(directory: Arc<dyn DirectoryAdapter>, config: EngineConfig) -> Self {
        Self { directory, config }
    }

    /// DN an entity of `kind` with `identifier` has in the configured layout.
    pub fn member_dn(&self, kind: MemberKind, identifier: &str) -> Dn {
        self.config
            .container_for(kind)
            .child(kind.key_attribute(), identifier)
    }

    /// Identify a stored DN from its position in the layout, without I/O.
    fn identify(&self, relation: Relation, dn: &Dn) -> Option<(MemberKind, String)> {
        let (attribute, value) = dn.first_rdn()?;
        relation.kinds().iter().copied().find_map(|kind| {
            (attribute.eq_ignore_ascii_case(kind.key_attribute())
                && dn.is_child_of(&self.config.container_for(kind)))
            .then(|| (kind, value.clone()))
        })
    }

    /// Plan adding `targets` to `relation` of `rule`.
    ///
    /// Each identifier is resolved to an existing entity of its kind.
    /// Unresolvable identifiers and existing members are reported in the
    /// outcome; only transport-level failures abort the plan.
    #[instrument(skip(self, rule, targets), fields(rule = %rule.dn))]
    pub async fn plan_add(
        &self,
        rule: &Entry,
        relation: Relation,
        targets: &MemberTargets,
    ) -> DirectoryResult<MemberPlan> {
        let mut outcome = MemberOutcome::new(relation, MemberAction::Add);
        let mut pending: Vec<Dn> = Vec::new();
        let current: Vec<Dn> = rule
            .get(relation.attribute())
            .iter()
            .map(|v| Dn::new(v.clone()))
            .collect();

        for (kind, identifiers) in targets.iter() {
            for identifier in distinct(identifiers) {
                if !relation.accepts(kind) {
                    outcome.fail(kind, identifier, FailureReason::KindNotAccepted);
                    continue;
                }

                let container = self.config.container_for(kind);
                let dn = match self
                    .directory
                    .resolve_dn(&container, kind.key_attribute(), identifier, kind.object_class())
                    .await
                {
                    Ok(dn) => dn,
                    Err(e) if e.is_not_found() => {
                        outcome.fail(kind, identifier, FailureReason::NoSuchEntry);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if current.contains(&dn) || pending.contains(&dn) {
                    outcome.fail(kind, identifier, FailureReason::AlreadyMember);
                    continue;
                }

                pending.push(dn);
                outcome.complete(kind, identifier);
            }
        }

        let mut delta = AttributeDelta::new();
        if !pending.is_empty() {
            delta.add(relation.attribute(), pending.iter().map(Dn::to_string));
        }

        Ok(MemberPlan { delta, outcome })
    }

    /// Plan removing `targets` from `relation` of `rule`.
    ///
    /// Matches stored DNs by kind and identifier; removing something that is
    /// not a member is reported, not an error.
    pub fn plan_remove(
        &self,
        rule: &Entry,
        relation: Relation,
        targets: &MemberTargets,
    ) -> MemberPlan {
        let mut outcome = MemberOutcome::new(relation, MemberAction::Remove);
        let mut pending: Vec<String> = Vec::new();
        let stored = rule.get(relation.attribute());

        for (kind, identifiers) in targets.iter() {
            for identifier in distinct(identifiers) {
                if !relation.accepts(kind) {
                    outcome.fail(kind, identifier, FailureReason::KindNotAccepted);
                    continue;
                }

                let found = stored.iter().find(|value| {
                    self.identify(relation, &Dn::new(value.as_str()))
                        .is_some_and(|(k, id)| k == kind && id.eq_ignore_ascii_case(identifier))
                });

                match found {
                    Some(value) if !pending.contains(value) => {
                        pending.push(value.clone());
                        outcome.complete(kind, identifier);
                    }
                    _ => outcome.fail(kind, identifier, FailureReason::NotMember),
                }
            }
        }

        let mut delta = AttributeDelta::new();
        if !pending.is_empty() {
            delta.delete(relation.attribute(), pending);
        }

        MemberPlan { delta, outcome }
    }

    /// Split a relation's stored DNs by the kind of entity they reference.
    ///
    /// Every reference is fetched and classified by object class. For DNs in
    /// the configured containers the identifier is taken from the DN once the
    /// kind is confirmed. Dangling references end up in
    /// [`Partition::unclassified`].
    pub async fn partition_by_kind(
        &self,
        relation: Relation,
        values: &[String],
    ) -> DirectoryResult<Partition> {
        let mut partition = Partition::default();

        for value in values {
            let dn = Dn::new(value.as_str());
            let expected = self.identify(relation, &dn);

            match self.classify_remote(relation, &dn).await? {
                Some((kind, identifier)) => {
                    let identifier = match expected {
                        Some((expected_kind, from_dn)) if expected_kind == kind => from_dn,
                        _ => identifier,
                    };
                    partition.by_kind.entry(kind).or_default().push(identifier);
                }
                None => partition.unclassified.push(value.clone()),
            }
        }

        for identifiers in partition.by_kind.values_mut() {
            identifiers.sort_by_key(|id| id.to_lowercase());
        }

        Ok(partition)
    }

    async fn classify_remote(
        &self,
        relation: Relation,
        dn: &Dn,
    ) -> DirectoryResult<Option<(MemberKind, String)>> {
        let mut requested: Vec<&str> = vec!["objectClass"];
        requested.extend(relation.kinds().iter().map(|k| k.key_attribute()));

        let entry = match self.directory.fetch_entry(dn, &requested).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                debug!(dn = %dn, "Member reference does not resolve");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(relation.kinds().iter().copied().find_map(|kind| {
            entry.has_value("objectClass", kind.object_class()).then(|| {
                let identifier = entry
                    .first(kind.key_attribute())
                    .map(str::to_string)
                    .or_else(|| dn.first_rdn().map(|(_, value)| value))
                    .unwrap_or_else(|| dn.to_string());
                (kind, identifier)
            })
        }))
    }
}

/// Trimmed, non-empty identifiers with case-insensitive duplicates removed.
fn distinct(identifiers: &[String]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for identifier in identifiers.iter().map(|s| s.trim()) {
        if !identifier.is_empty() && !seen.iter().any(|s| s.eq_ignore_ascii_case(identifier)) {
            seen.push(identifier);
        }
    }
    seen
}
