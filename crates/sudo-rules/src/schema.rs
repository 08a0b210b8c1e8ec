//! Rule schema
//!
//! The sudo rule's parameters as an explicit table of field descriptors.
//! Each descriptor carries the attribute's type, cardinality and the
//! operations it may be supplied to; [`RuleSchema::validate`] interprets the
//! table to check and normalize caller input before any directory request.
//!
//! # Example
//!
//! ```ignore
//! use sudo_rules::schema::{Operation, RuleInput, RuleSchema};
//!
//! let schema = RuleSchema::sudorule();
//! let mut input = RuleInput::new();
//! input.insert("cn".into(), vec!["webadmins".into()]);
//! input.insert("usercategory".into(), vec!["ALL".into()]);
//!
//! let normalized = schema.validate(Operation::Create, &input)?;
//! assert_eq!(normalized["userCategory"], vec!["all"]);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;
use crate::membership::Relation;

/// Primary key attribute.
pub const ATTR_NAME: &str = "cn";
/// Free-form description.
pub const ATTR_DESCRIPTION: &str = "description";
/// Enabled flag, only changed by enable/disable.
pub const ATTR_ENABLED: &str = "ipaEnabledFlag";
/// Categorical user scope.
pub const ATTR_USER_CATEGORY: &str = "userCategory";
/// Categorical host scope.
pub const ATTR_HOST_CATEGORY: &str = "hostCategory";
/// Categorical command scope.
pub const ATTR_CMD_CATEGORY: &str = "cmdCategory";
/// System-generated stable identifier, also the RDN attribute.
pub const ATTR_UNIQUE_ID: &str = "ipaUniqueID";

/// Object classes every rule entry carries.
pub const OBJECT_CLASSES: [&str; 2] = ["ipaassociation", "ipasudorule"];

/// Object class identifying rule entries in searches.
pub const RULE_OBJECT_CLASS: &str = "ipasudorule";

/// Attributes read back for show and search.
pub const DEFAULT_ATTRIBUTES: [&str; 11] = [
    ATTR_NAME,
    ATTR_ENABLED,
    ATTR_DESCRIPTION,
    ATTR_USER_CATEGORY,
    ATTR_HOST_CATEGORY,
    ATTR_CMD_CATEGORY,
    "memberUser",
    "memberHost",
    "memberAllowCmd",
    "memberDenyCmd",
    ATTR_UNIQUE_ID,
];

/// Map of attribute name to values.
///
/// An empty value list in update input clears the attribute.
pub type RuleInput = BTreeMap<String, Vec<String>>;

/// Operation the input is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Search,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Search => write!(f, "search"),
        }
    }
}

/// Value type of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Free-form string.
    Str,
    /// Boolean stored as `TRUE`/`FALSE`.
    Flag,
    /// String restricted to a fixed set (compared case-insensitively).
    StrEnum { values: Vec<String> },
}

/// Descriptor for one rule parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Attribute (or read-side parameter) name.
    pub name: String,

    /// Display label.
    pub label: String,

    /// Short option name used by the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_name: Option<String>,

    /// Help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    /// Value type.
    pub kind: FieldKind,

    /// Whether the field may hold multiple values.
    #[serde(default)]
    pub multi_valued: bool,

    /// Whether create requires the field.
    #[serde(default)]
    pub required: bool,

    /// Whether this is the rule's primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// Not accepted by create.
    #[serde(default)]
    pub no_create: bool,

    /// Not accepted by update.
    #[serde(default)]
    pub no_update: bool,

    /// Not usable as a search filter.
    #[serde(default)]
    pub no_search: bool,
}

impl FieldDescriptor {
    /// Create an optional, single-valued field accepted everywhere.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            cli_name: None,
            doc: None,
            kind,
            multi_valued: false,
            required: false,
            primary_key: false,
            no_create: false,
            no_update: false,
            no_search: false,
        }
    }

    /// Set the display label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the command line option name.
    #[must_use]
    pub fn cli_name(mut self, cli_name: impl Into<String>) -> Self {
        self.cli_name = Some(cli_name.into());
        self
    }

    /// Set the help text.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Mark as the primary key: required at create, immutable afterwards.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.required = true;
        self.no_update = true;
        self
    }

    /// Allow multiple values.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Exclude from create, update and search input.
    #[must_use]
    pub fn system_managed(mut self) -> Self {
        self.no_create = true;
        self.no_update = true;
        self.no_search = true;
        self
    }

    /// Check if the field may be supplied to `operation`.
    pub fn permits(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => !self.no_create,
            Operation::Update => !self.no_update,
            Operation::Search => !self.no_search,
        }
    }

    /// Check and normalize raw values. Blank values are dropped.
    pub fn normalize(&self, values: &[String]) -> Result<Vec<String>, ValidationError> {
        let mut normalized = Vec::with_capacity(values.len());

        for raw in values {
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }

            let value = match &self.kind {
                FieldKind::Str => value.to_string(),
                FieldKind::Flag => match value.to_ascii_uppercase().as_str() {
                    "TRUE" | "1" | "YES" => "TRUE".to_string(),
                    "FALSE" | "0" | "NO" => "FALSE".to_string(),
                    _ => {
                        return Err(ValidationError::InvalidValue {
                            attribute: self.name.clone(),
                            value: value.to_string(),
                            allowed: "'TRUE', 'FALSE'".to_string(),
                        })
                    }
                },
                FieldKind::StrEnum { values: allowed } => allowed
                    .iter()
                    .find(|candidate| candidate.eq_ignore_ascii_case(value))
                    .cloned()
                    .ok_or_else(|| ValidationError::InvalidValue {
                        attribute: self.name.clone(),
                        value: value.to_string(),
                        allowed: allowed
                            .iter()
                            .map(|v| format!("'{v}'"))
                            .collect::<Vec<_>>()
                            .join(", "),
                    })?,
            };
            normalized.push(value);
        }

        if normalized.len() > 1 && !self.multi_valued {
            return Err(ValidationError::TooManyValues {
                attribute: self.name.clone(),
            });
        }

        Ok(normalized)
    }
}

/// Schema of a directory-backed object: identity plus field table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSchema {
    /// Singular display name.
    pub object_name: String,

    /// Plural display name.
    pub object_name_plural: String,

    /// Object classes written at create time.
    pub object_classes: Vec<String>,

    /// RDN attribute of stored entries.
    pub rdn_attribute: String,

    /// Field table in display order.
    pub fields: Vec<FieldDescriptor>,
}

impl RuleSchema {
    /// Schema of a sudo rule.
    pub fn sudorule() -> Self {
        let all = || FieldKind::StrEnum {
            values: vec!["all".to_string()],
        };

        let mut fields = vec![
            FieldDescriptor::new(ATTR_NAME, FieldKind::Str)
                .label("Rule name")
                .cli_name("sudorule_name")
                .primary_key(),
            FieldDescriptor::new(ATTR_DESCRIPTION, FieldKind::Str)
                .label("Description")
                .cli_name("desc"),
            FieldDescriptor::new(ATTR_ENABLED, FieldKind::Flag)
                .label("Enabled")
                .system_managed(),
            FieldDescriptor::new(ATTR_USER_CATEGORY, all())
                .label("User category")
                .cli_name("usercat")
                .doc("User category the rule applies to"),
            FieldDescriptor::new(ATTR_HOST_CATEGORY, all())
                .label("Host category")
                .cli_name("hostcat")
                .doc("Host category the rule applies to"),
            FieldDescriptor::new(ATTR_CMD_CATEGORY, all())
                .label("Command category")
                .cli_name("cmdcat")
                .doc("Command category the rule applies to"),
        ];

        for relation in Relation::ALL {
            for kind in relation.kinds() {
                fields.push(
                    FieldDescriptor::new(relation.view_param(*kind), FieldKind::Str)
                        .label(relation.view_label(*kind))
                        .multi_valued()
                        .system_managed(),
                );
            }
        }

        Self {
            object_name: "Sudo Rule".to_string(),
            object_name_plural: "Sudo Rules".to_string(),
            object_classes: OBJECT_CLASSES.iter().map(|s| s.to_string()).collect(),
            rdn_attribute: ATTR_UNIQUE_ID.to_string(),
            fields,
        }
    }

    /// Look up a field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// The primary key field.
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Display label for a field, falling back to the name itself.
    pub fn label<'a>(&'a self, name: &'a str) -> &'a str {
        self.field(name).map(|f| f.label.as_str()).unwrap_or(name)
    }

    /// Validate and normalize input for `operation`.
    ///
    /// Returns the input keyed by canonical attribute names. Unknown
    /// attributes are rejected. Known attributes the operation does not
    /// accept are dropped, except the primary key in update input, which is
    /// rejected. In update output an empty value list means "clear".
    pub fn validate(
        &self,
        operation: Operation,
        input: &RuleInput,
    ) -> Result<RuleInput, ValidationError> {
        let mut normalized = RuleInput::new();

        for (name, values) in input {
            let field = self
                .field(name)
                .ok_or_else(|| ValidationError::UnknownAttribute {
                    attribute: name.clone(),
                })?;

            if !field.permits(operation) {
                if field.primary_key {
                    return Err(ValidationError::NotPermitted {
                        attribute: field.name.clone(),
                        operation: operation.to_string(),
                    });
                }
                warn!(attribute = %field.name, %operation, "Ignoring attribute not accepted by this operation");
                continue;
            }

            let values = field.normalize(values)?;

            if values.is_empty() {
                if field.required && operation == Operation::Create {
                    return Err(ValidationError::Empty {
                        attribute: field.name.clone(),
                    });
                }
                if operation != Operation::Update {
                    continue;
                }
            }

            normalized.insert(field.name.clone(), values);
        }

        if operation == Operation::Create {
            if let Some(missing) = self
                .fields
                .iter()
                .find(|f| f.required && !normalized.contains_key(&f.name))
            {
                return Err(ValidationError::Required {
                    attribute: missing.name.clone(),
                });
            }
        }

        Ok(normalized)
    }
}
