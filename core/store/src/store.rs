//! Note store trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use decksync_common::{ContainerPath, EntryId, Result};

use crate::query::EntryQuery;

/// Field values of a two-sided entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteFields {
    /// Prompt side markup.
    #[serde(rename = "Front")]
    pub front: String,
    /// Answer side markup.
    #[serde(rename = "Back")]
    pub back: String,
}

impl NoteFields {
    /// Create fields from front and back markup.
    pub fn new(front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
        }
    }
}

/// Result of asking the store to create an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The entry was created with this identifier.
    Created(EntryId),
    /// The store refused the entry under its own duplicate rule.
    DuplicateRejected,
}

/// Remote note store operations used by the sync engine.
///
/// Every method is a single request/response exchange. Transport problems
/// surface as `Error::StoreUnavailable`; protocol rejections as `Error::Store`.
/// Implementations must tolerate concurrent independent exchanges.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Get the store name (e.g., "ankiconnect", "memory").
    fn name(&self) -> &str;

    /// Protocol version the store speaks. Used as a reachability check.
    async fn version(&self) -> Result<u32>;

    /// Create a container and its parents.
    ///
    /// # Postconditions
    /// - Container exists; calling again is a no-op
    async fn ensure_container(&self, path: &ContainerPath) -> Result<()>;

    /// Whether the container holds at least one entry.
    ///
    /// A container that does not exist has no entries.
    async fn container_has_entries(&self, path: &ContainerPath) -> Result<bool>;

    /// Find entries matching a structured query.
    ///
    /// Returns an empty vector when nothing matches.
    async fn find_entries(&self, query: &EntryQuery) -> Result<Vec<EntryId>>;

    /// Create an entry in a container.
    ///
    /// A duplicate rejection by the store is `Ok(CreateOutcome::DuplicateRejected)`.
    async fn create_entry(
        &self,
        container: &ContainerPath,
        fields: &NoteFields,
        tags: &[String],
    ) -> Result<CreateOutcome>;

    /// Overwrite the fields of an existing entry.
    async fn update_entry(&self, id: EntryId, fields: &NoteFields) -> Result<()>;

    /// Upload a media file.
    ///
    /// Uploading the same filename twice overwrites. The returned name is what
    /// must be embedded in markup; it may differ from `filename`.
    async fn store_media(&self, filename: &str, data: &[u8]) -> Result<String>;

    /// Names of stored media files matching a glob pattern.
    async fn find_media(&self, pattern: &str) -> Result<Vec<String>>;

    /// Names of all containers.
    async fn container_names(&self) -> Result<Vec<String>>;
}
