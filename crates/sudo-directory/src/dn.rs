//! Distinguished names
//!
//! A thin owned wrapper around a DN string. Equality and hashing are
//! case-insensitive, matching how directory servers compare DNs for the
//! attribute syntaxes used here.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Distinguished name of a directory entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dn(String);

impl Dn {
    /// Wrap an already-formatted DN string.
    pub fn new(dn: impl Into<String>) -> Self {
        Self(dn.into())
    }

    /// The root (empty) DN.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Get the DN string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is the root DN.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Build the DN of a child entry, escaping the RDN value.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Dn {
        let rdn = format!("{}={}", attribute, escape_dn_value(value));
        self.prepend(&rdn)
    }

    /// Prepend a relative DN that is already escaped (e.g. `cn=sudorules,cn=sudo`).
    #[must_use]
    pub fn prepend(&self, relative: &str) -> Dn {
        let relative = relative.trim().trim_end_matches(',');
        if relative.is_empty() {
            self.clone()
        } else if self.is_root() {
            Dn(relative.to_string())
        } else {
            Dn(format!("{},{}", relative, self.0))
        }
    }

    /// Split into the raw (still escaped) RDN components.
    pub fn rdns(&self) -> Vec<&str> {
        split_unescaped(&self.0, ',')
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// The first RDN as an unescaped `(attribute, value)` pair.
    pub fn first_rdn(&self) -> Option<(String, String)> {
        let rdn = *self.rdns().first()?;
        let parts = split_unescaped(rdn, '=');
        if parts.len() < 2 {
            return None;
        }
        let attribute = parts[0].trim().to_string();
        // Everything after the first separator belongs to the value.
        let value = &rdn[parts[0].len() + 1..];
        Some((attribute, unescape_dn_value(value.trim())))
    }

    /// The parent entry's DN, or `None` for a single-RDN or root DN.
    pub fn parent(&self) -> Option<Dn> {
        let rdns = self.rdns();
        if rdns.len() < 2 {
            return None;
        }
        Some(Dn(rdns[1..].join(",")))
    }

    /// Check whether this entry lies beneath `ancestor` (strictly).
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        let own = self.normalized_rdns();
        let theirs = ancestor.normalized_rdns();
        own.len() > theirs.len() && own.ends_with(&theirs)
    }

    /// Check whether `parent` is this entry's immediate parent.
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.parent().is_some_and(|p| p == *parent)
    }

    /// Normalized form used for comparisons.
    pub fn normalized(&self) -> String {
        self.normalized_rdns().join(",")
    }

    fn normalized_rdns(&self) -> Vec<String> {
        self.rdns()
            .into_iter()
            .map(|rdn| {
                let parts = split_unescaped(rdn, '=');
                if parts.len() < 2 {
                    return rdn.to_lowercase();
                }
                let value = &rdn[parts[0].len() + 1..];
                format!(
                    "{}={}",
                    parts[0].trim().to_lowercase(),
                    value.trim().to_lowercase()
                )
            })
            .collect()
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl std::fmt::Display for Dn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Dn {
    fn from(s: &str) -> Self {
        Dn::new(s)
    }
}

impl From<String> for Dn {
    fn from(s: String) -> Self {
        Dn::new(s)
    }
}

/// Escape special characters in DN attribute values per RFC 4514.
///
/// Characters that must be escaped:
/// - Leading or trailing SPACE (escaped as \20)
/// - Leading # (escaped as \23)
/// - Characters: , + " \ < > ; = (escaped with backslash prefix)
/// - NUL character (escaped as \00)
pub fn escape_dn_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let last = value.chars().count() - 1;
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        let is_first = i == 0;
        let is_last = i == last;

        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if is_first || is_last => result.push_str("\\20"),
            '#' if is_first => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// Reverse RFC 4514 escaping, including `\XX` hex pairs.
pub fn unescape_dn_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                }
                None => {
                    out.push(bytes[i + 1]);
                    i += 2;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Split on `sep` where it is not preceded by an escaping backslash.
fn split_unescaped(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
        } else if ch == sep {
            parts.push(&input[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}
