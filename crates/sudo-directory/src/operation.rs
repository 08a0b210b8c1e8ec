//! Directory operation types
//!
//! Entries, attribute deltas and search filters exchanged with a
//! [`DirectoryAdapter`](crate::traits::DirectoryAdapter).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dn::Dn;

/// A directory entry: DN plus multi-valued string attributes.
///
/// Attribute names are case-insensitive and stored lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: Dn,

    /// Map of lowercased attribute name to values.
    #[serde(default)]
    attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Create an entry with no attributes.
    pub fn new(dn: impl Into<Dn>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set all values of an attribute, replacing existing ones.
    pub fn set<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            self.attributes.remove(&name.to_lowercase());
        } else {
            self.attributes.insert(name.to_lowercase(), values);
        }
    }

    /// Set an attribute using builder pattern.
    #[must_use]
    pub fn with<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(name, values);
        self
    }

    /// Get all values of an attribute.
    pub fn get(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Get the first value of an attribute.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).first().map(String::as_str)
    }

    /// Check if an attribute has at least one value.
    pub fn has(&self, name: &str) -> bool {
        !self.get(name).is_empty()
    }

    /// Check if an attribute holds a value (case-insensitive comparison).
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.get(name).iter().any(|v| v.eq_ignore_ascii_case(value))
    }

    /// Remove an attribute entirely.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.attributes.remove(&name.to_lowercase())
    }

    /// Iterate over all attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.attributes.iter()
    }

    /// Keep only the requested attributes (`*` keeps all).
    #[must_use]
    pub fn project(mut self, requested: &[&str]) -> Self {
        if requested.is_empty() || requested.contains(&"*") {
            return self;
        }
        let wanted: Vec<String> = requested.iter().map(|a| a.to_lowercase()).collect();
        self.attributes.retain(|name, _| wanted.contains(name));
        self
    }

    /// Apply a delta to this entry in place, without effectiveness checks.
    pub fn apply(&mut self, delta: &AttributeDelta) {
        for modification in delta.iter() {
            match modification {
                Modification::Add(name, values) => {
                    let key = name.to_lowercase();
                    let current = self.attributes.entry(key).or_default();
                    for value in values {
                        if !current.iter().any(|v| v.eq_ignore_ascii_case(value)) {
                            current.push(value.clone());
                        }
                    }
                }
                Modification::Delete(name, values) => {
                    let key = name.to_lowercase();
                    if values.is_empty() {
                        self.attributes.remove(&key);
                    } else if let Some(current) = self.attributes.get_mut(&key) {
                        current.retain(|v| !values.iter().any(|d| d.eq_ignore_ascii_case(v)));
                        if current.is_empty() {
                            self.attributes.remove(&key);
                        }
                    }
                }
                Modification::Replace(name, values) => {
                    self.set(name, values.iter().cloned());
                }
            }
        }
    }
}

/// A single attribute modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "attribute", rename_all = "snake_case")]
pub enum Modification {
    /// Add values to an attribute.
    Add(String, Vec<String>),
    /// Delete values from an attribute; no values deletes the attribute.
    Delete(String, Vec<String>),
    /// Replace all values; no values deletes the attribute.
    Replace(String, Vec<String>),
}

impl Modification {
    /// Name of the attribute this modification touches.
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add(name, _)
            | Modification::Delete(name, _)
            | Modification::Replace(name, _) => name,
        }
    }
}

/// Ordered set of modifications applied atomically to one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDelta {
    modifications: Vec<Modification>,
}

impl AttributeDelta {
    /// Create a new empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add values to an attribute.
    pub fn add<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifications.push(Modification::Add(
            name.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Remove values from an attribute.
    pub fn delete<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifications.push(Modification::Delete(
            name.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Replace all values of an attribute.
    pub fn replace<I, S>(&mut self, name: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifications.push(Modification::Replace(
            name.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Remove an attribute entirely.
    pub fn clear_attribute(&mut self, name: impl Into<String>) -> &mut Self {
        self.modifications
            .push(Modification::Replace(name.into(), Vec::new()));
        self
    }

    /// Check if this delta has any changes.
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Number of modifications.
    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    /// Iterate over modifications in order.
    pub fn iter(&self) -> impl Iterator<Item = &Modification> {
        self.modifications.iter()
    }

    /// Get all affected attribute names, sorted and deduplicated.
    pub fn affected_attributes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modifications.iter().map(|m| m.attribute()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Reduce this delta to the modifications that would change `current`.
    ///
    /// Adds of values already present, deletes of values not present and
    /// replaces with the current value set are dropped. An empty result means
    /// the request is a no-op for this entry.
    pub fn effective_against(&self, current: &Entry) -> AttributeDelta {
        let mut working = current.clone();
        let mut effective = AttributeDelta::new();

        for modification in &self.modifications {
            let reduced = match modification {
                Modification::Add(name, values) => {
                    let mut fresh: Vec<String> = Vec::new();
                    for value in values {
                        let duplicate = fresh.iter().any(|v| v.eq_ignore_ascii_case(value));
                        if !duplicate && !working.has_value(name, value) {
                            fresh.push(value.clone());
                        }
                    }
                    (!fresh.is_empty()).then(|| Modification::Add(name.clone(), fresh))
                }
                Modification::Delete(name, values) if values.is_empty() => working
                    .has(name)
                    .then(|| Modification::Delete(name.clone(), Vec::new())),
                Modification::Delete(name, values) => {
                    let present: Vec<String> = values
                        .iter()
                        .filter(|v| working.has_value(name, v))
                        .cloned()
                        .collect();
                    (!present.is_empty()).then(|| Modification::Delete(name.clone(), present))
                }
                Modification::Replace(name, values) => {
                    (!same_values(working.get(name), values)).then(|| modification.clone())
                }
            };

            if let Some(reduced) = reduced {
                let mut single = AttributeDelta::new();
                single.modifications.push(reduced.clone());
                working.apply(&single);
                effective.modifications.push(reduced);
            }
        }

        effective
    }
}

/// Compare value sets ignoring order. Values are compared exactly so that a
/// case-only change (e.g. a description edit) still counts as a change.
fn same_values(current: &[String], requested: &[String]) -> bool {
    let mut a: Vec<&str> = current.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = requested.iter().map(String::as_str).collect();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();
    a == b
}

/// Filter for search operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    /// Match entries where attribute equals value.
    Equals { attribute: String, value: String },

    /// Match entries where attribute contains value (substring).
    Contains { attribute: String, value: String },

    /// Match entries where attribute starts with value.
    StartsWith { attribute: String, value: String },

    /// Match entries where attribute exists (has any value).
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a contains filter.
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a starts-with filter.
    pub fn starts_with(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::StartsWith {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a present (attribute exists) filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Filter::Present {
            attribute: attribute.into(),
        }
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And { filters }
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or { filters }
    }

    /// Create a NOT filter (negation).
    pub fn negate(filter: Filter) -> Self {
        Filter::Not {
            filter: Box::new(filter),
        }
    }

    /// Combine this filter with another using AND.
    #[must_use]
    pub fn and_with(self, other: Filter) -> Self {
        match self {
            Filter::And { mut filters } => {
                filters.push(other);
                Filter::And { filters }
            }
            _ => Filter::And {
                filters: vec![self, other],
            },
        }
    }

    /// Render as an LDAP filter string (RFC 4515).
    pub fn to_ldap_string(&self) -> String {
        match self {
            Filter::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap_string).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Or { filters } => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap_string).collect();
                format!("(|{})", inner.join(""))
            }
            Filter::Not { filter } => format!("(!{})", filter.to_ldap_string()),
            Filter::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_filter_value(value))
            }
            Filter::Contains { attribute, value } => {
                format!("({}=*{}*)", attribute, escape_filter_value(value))
            }
            Filter::StartsWith { attribute, value } => {
                format!("({}={}*)", attribute, escape_filter_value(value))
            }
            Filter::Present { attribute } => format!("({}=*)", attribute),
        }
    }

    /// Evaluate against an entry. Matching is case-insensitive.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And { filters } => filters.iter().all(|f| f.matches(entry)),
            Filter::Or { filters } => filters.iter().any(|f| f.matches(entry)),
            Filter::Not { filter } => !filter.matches(entry),
            Filter::Equals { attribute, value } => entry.has_value(attribute, value),
            Filter::Contains { attribute, value } => {
                let needle = value.to_lowercase();
                entry
                    .get(attribute)
                    .iter()
                    .any(|v| v.to_lowercase().contains(&needle))
            }
            Filter::StartsWith { attribute, value } => {
                let needle = value.to_lowercase();
                entry
                    .get(attribute)
                    .iter()
                    .any(|v| v.to_lowercase().starts_with(&needle))
            }
            Filter::Present { attribute } => entry.has(attribute),
        }
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}
