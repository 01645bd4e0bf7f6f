//! Structured entry queries and their rendering to the store's search syntax.

use decksync_common::ContainerPath;

/// Query for entries in a container whose front field matches a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    /// Container to search in.
    pub container: ContainerPath,
    /// Front text to match.
    pub front: String,
    /// Match fronts that start with `front` instead of equal it.
    ///
    /// Needed when media markup is appended to the stored front.
    pub prefix: bool,
}

impl EntryQuery {
    /// Exact-match query on the front field.
    pub fn exact(container: ContainerPath, front: impl Into<String>) -> Self {
        Self {
            container,
            front: front.into(),
            prefix: false,
        }
    }

    /// Prefix-match query on the front field.
    pub fn prefix(container: ContainerPath, front: impl Into<String>) -> Self {
        Self {
            container,
            front: front.into(),
            prefix: true,
        }
    }

    /// Render as a search string, e.g. `deck:"French::IPA" "Front:<big>a</big>"`.
    pub fn to_search(&self) -> String {
        let wildcard = if self.prefix { "*" } else { "" };
        format!(
            "{} \"Front:{}{}\"",
            container_filter(&self.container),
            escape_field_text(&self.front),
            wildcard
        )
    }
}

/// Search filter selecting one container.
pub fn container_filter(container: &ContainerPath) -> String {
    format!("deck:\"{}\"", escape_quotes(&container.to_string()))
}

/// Escape `"` for interpolation inside a quoted search term.
pub fn escape_quotes(text: &str) -> String {
    text.replace('"', "\\\"")
}

/// Escape text matched against a field.
///
/// Besides quotes, `\`, `*` and `_` are search metacharacters and must be
/// taken literally.
pub fn escape_field_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '"' | '*' | '_' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
