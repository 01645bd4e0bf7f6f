//! Common types used throughout decksync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between container path components, as used by the note store.
pub const CONTAINER_SEPARATOR: &str = "::";

/// Identifier the remote store assigns to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hierarchical container name, e.g. `French::IPA`.
///
/// Containers form a tree (language, then content type). The store creates
/// intermediate levels implicitly, so only the full path is ever sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerPath {
    components: Vec<String>,
}

impl ContainerPath {
    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if there are no components
    /// - Returns error if any component is empty or contains the separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        if components.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Container path cannot be empty".to_string(),
            ));
        }
        for comp in &components {
            if comp.trim().is_empty() {
                return Err(crate::Error::InvalidInput(
                    "Container path component cannot be empty".to_string(),
                ));
            }
            if comp.contains(CONTAINER_SEPARATOR) {
                return Err(crate::Error::InvalidInput(format!(
                    "Container path component cannot contain '{}'",
                    CONTAINER_SEPARATOR
                )));
            }
        }
        Ok(Self { components })
    }

    /// Parse a `::`-separated path.
    pub fn parse(path: &str) -> crate::Result<Self> {
        let components = path
            .split(CONTAINER_SEPARATOR)
            .map(|c| c.trim().to_string())
            .collect();
        Self::from_components(components)
    }

    /// All ancestors from the root down to (and including) this path.
    pub fn lineage(&self) -> Vec<Self> {
        (1..=self.components.len())
            .map(|n| Self {
                components: self.components[..n].to_vec(),
            })
            .collect()
    }

    /// Whether `other` is this path or lies beneath it.
    pub fn contains(&self, other: &ContainerPath) -> bool {
        other.components.starts_with(&self.components)
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join(CONTAINER_SEPARATOR))
    }
}

impl TryFrom<String> for ContainerPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContainerPath> for String {
    fn from(value: ContainerPath) -> Self {
        value.to_string()
    }
}

/// One source row: field names mapped to values, in source column order.
///
/// Records are immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentRecord {
    fields: Vec<(String, String)>,
}

impl ContentRecord {
    /// Build a record from ordered `(name, value)` pairs.
    pub fn new<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of a field, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Value of a field, treating an empty value as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Value of a field the caller cannot do without.
    pub fn require(&self, name: &str) -> crate::Result<&str> {
        self.get(name).ok_or_else(|| {
            crate::Error::InvalidInput(format!("Record has no '{}' field", name))
        })
    }

    /// Field names in source order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }
}
