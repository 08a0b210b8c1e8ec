//! Typed view of a stored sudo rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sudo_directory::dn::Dn;
use sudo_directory::operation::Entry;
use tracing::warn;

use crate::error::{Result, RuleError};
use crate::membership::{MemberKind, Partition, Relation};
use crate::schema::{
    ATTR_CMD_CATEGORY, ATTR_DESCRIPTION, ATTR_ENABLED, ATTR_HOST_CATEGORY, ATTR_NAME,
    ATTR_UNIQUE_ID, ATTR_USER_CATEGORY,
};

/// Categorical scope of a rule dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Applies to every user, host or command.
    All,
}

impl Category {
    /// Parse a stored value (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        value.eq_ignore_ascii_case("all").then_some(Category::All)
    }

    /// Stored form.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::All => "all",
        }
    }
}

/// A sudo rule as read from the directory.
#[derive(Debug, Clone, Serialize)]
pub struct RuleRecord {
    /// Rule name (primary key).
    pub name: String,

    /// Stable identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Entry DN.
    pub dn: Dn,

    /// Whether the rule is enabled.
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_category: Option<Category>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_category: Option<Category>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd_category: Option<Category>,

    /// Members split by kind, keyed by read-side parameter name
    /// (`memberuser_user`, `memberhost_hostgroup`, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, Vec<String>>,

    /// Stored member DNs whose kind could not be determined.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_members: Vec<String>,

    #[serde(skip)]
    relations: BTreeMap<Relation, Vec<String>>,
}

impl RuleRecord {
    /// Interpret a rule entry. Members are left unpartitioned.
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let name = entry
            .first(ATTR_NAME)
            .ok_or_else(|| RuleError::MalformedEntry {
                dn: entry.dn.to_string(),
                message: format!("missing {ATTR_NAME}"),
            })?
            .to_string();

        let category = |attribute: &str| {
            let raw = entry.first(attribute)?;
            let parsed = Category::parse(raw);
            if parsed.is_none() {
                warn!(dn = %entry.dn, attribute, value = raw, "Ignoring unknown category value");
            }
            parsed
        };

        let relations = Relation::ALL
            .into_iter()
            .filter(|relation| entry.has(relation.attribute()))
            .map(|relation| (relation, entry.get(relation.attribute()).to_vec()))
            .collect();

        Ok(Self {
            name,
            uuid: entry.first(ATTR_UNIQUE_ID).map(str::to_string),
            dn: entry.dn.clone(),
            enabled: entry
                .first(ATTR_ENABLED)
                .is_some_and(|v| v.eq_ignore_ascii_case("TRUE")),
            description: entry.first(ATTR_DESCRIPTION).map(str::to_string),
            user_category: category(ATTR_USER_CATEGORY),
            host_category: category(ATTR_HOST_CATEGORY),
            cmd_category: category(ATTR_CMD_CATEGORY),
            members: BTreeMap::new(),
            unresolved_members: Vec::new(),
            relations,
        })
    }

    /// Stored member DNs of a relation.
    pub fn member_dns(&self, relation: Relation) -> &[String] {
        self.relations
            .get(&relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Member identifiers of one kind in a relation (after partitioning).
    pub fn members_of(&self, relation: Relation, kind: MemberKind) -> &[String] {
        self.members
            .get(&relation.view_param(kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Category governing a relation's dimension.
    pub fn category_for(&self, relation: Relation) -> Option<Category> {
        match relation {
            Relation::MemberUser => self.user_category,
            Relation::MemberHost => self.host_category,
            Relation::MemberAllowCmd | Relation::MemberDenyCmd => self.cmd_category,
        }
    }

    /// Whether the relation's dimension matches unconditionally.
    ///
    /// A categorical dimension matches regardless of explicit members; both
    /// may be stored at once.
    pub fn is_categorical(&self, relation: Relation) -> bool {
        self.category_for(relation) == Some(Category::All)
    }

    pub(crate) fn apply_partition(&mut self, relation: Relation, partition: Partition) {
        for (kind, identifiers) in partition.by_kind {
            if !identifiers.is_empty() {
                self.members.insert(relation.view_param(kind), identifiers);
            }
        }
        self.unresolved_members.extend(partition.unclassified);
    }
}
