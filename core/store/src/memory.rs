//! In-memory note store for testing and dry runs.

use async_trait::async_trait;
use glob::Pattern;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use decksync_common::{ContainerPath, EntryId, Error, Result};

use crate::ankiconnect::PROTOCOL_VERSION;
use crate::query::EntryQuery;
use crate::store::{CreateOutcome, NoteFields, NoteStore};

/// An entry held by the memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Store-assigned identifier.
    pub id: EntryId,
    /// Container the entry lives in.
    pub container: ContainerPath,
    /// Current field values.
    pub fields: NoteFields,
    /// Tags given at creation.
    pub tags: Vec<String>,
}

#[derive(Default)]
struct Inner {
    containers: BTreeSet<ContainerPath>,
    entries: Vec<StoredEntry>,
    media: HashMap<String, Vec<u8>>,
    media_names: HashMap<String, String>,
    next_id: u64,
    calls: HashMap<&'static str, usize>,
    offline: bool,
    failing_uploads: HashSet<String>,
    failing_creates: HashSet<String>,
}

/// In-memory note store.
///
/// Follows the remote store's rules closely enough to exercise the sync
/// engine: containers are created with their parents, creation rejects a
/// duplicate front within the same container (compared with markup
/// stripped, which is stricter than an exact query), and media overwrite
/// by filename. Failures can be injected per action and every exchange is
/// counted under its protocol action name.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count an exchange and fail it when the store is offline.
    fn exchange(&self, action: &'static str) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        *inner.calls.entry(action).or_insert(0) += 1;
        if inner.offline {
            return Err(Error::StoreUnavailable(format!(
                "{} could not connect: store offline",
                action
            )));
        }
        Ok(inner)
    }

    /// Make every following exchange fail as a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make uploads of `filename` fail as a transport error.
    pub fn fail_media_upload(&self, filename: impl Into<String>) {
        self.lock().failing_uploads.insert(filename.into());
    }

    /// Make creation of an entry with this front fail as a transport error.
    pub fn fail_create(&self, front: impl Into<String>) {
        self.lock().failing_creates.insert(front.into());
    }

    /// Store uploads of `requested` under `stored` instead.
    pub fn rename_media(&self, requested: impl Into<String>, stored: impl Into<String>) {
        self.lock()
            .media_names
            .insert(requested.into(), stored.into());
    }

    /// Add an entry directly, bypassing duplicate checks and counters.
    pub fn seed_entry(&self, container: &ContainerPath, fields: NoteFields) -> EntryId {
        let mut inner = self.lock();
        for level in container.lineage() {
            inner.containers.insert(level);
        }
        let id = EntryId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(StoredEntry {
            id,
            container: container.clone(),
            fields,
            tags: Vec::new(),
        });
        id
    }

    /// Number of exchanges made for a protocol action.
    pub fn calls(&self, action: &str) -> usize {
        self.lock().calls.get(action).copied().unwrap_or(0)
    }

    /// Number of exchanges made in total.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    /// Entries stored in exactly this container, in creation order.
    pub fn entries_in(&self, container: &ContainerPath) -> Vec<StoredEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|e| &e.container == container)
            .cloned()
            .collect()
    }

    /// Entry by id.
    pub fn entry(&self, id: EntryId) -> Option<StoredEntry> {
        self.lock().entries.iter().find(|e| e.id == id).cloned()
    }

    /// Stored media payload by name.
    pub fn media(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().media.get(name).cloned()
    }

    /// Whether a container exists.
    pub fn has_container(&self, container: &ContainerPath) -> bool {
        self.lock().containers.contains(container)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove markup tags, keeping text content.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[async_trait]
impl NoteStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn version(&self) -> Result<u32> {
        drop(self.exchange("version")?);
        Ok(PROTOCOL_VERSION)
    }

    async fn ensure_container(&self, path: &ContainerPath) -> Result<()> {
        let mut inner = self.exchange("createDeck")?;
        for level in path.lineage() {
            inner.containers.insert(level);
        }
        Ok(())
    }

    async fn container_has_entries(&self, path: &ContainerPath) -> Result<bool> {
        let inner = self.exchange("findNotes")?;
        Ok(inner.entries.iter().any(|e| path.contains(&e.container)))
    }

    async fn find_entries(&self, query: &EntryQuery) -> Result<Vec<EntryId>> {
        let inner = self.exchange("findNotes")?;
        Ok(inner
            .entries
            .iter()
            .filter(|e| query.container.contains(&e.container))
            .filter(|e| {
                if query.prefix {
                    e.fields.front.starts_with(&query.front)
                } else {
                    e.fields.front == query.front
                }
            })
            .map(|e| e.id)
            .collect())
    }

    async fn create_entry(
        &self,
        container: &ContainerPath,
        fields: &NoteFields,
        tags: &[String],
    ) -> Result<CreateOutcome> {
        let mut inner = self.exchange("addNote")?;

        if inner.failing_creates.contains(&fields.front) {
            return Err(Error::StoreUnavailable(
                "addNote timed out: injected failure".to_string(),
            ));
        }
        if !inner.containers.contains(container) {
            return Err(Error::store(
                "addNote",
                format!("deck was not found: {}", container),
            ));
        }

        let key = strip_markup(&fields.front);
        let duplicate = inner
            .entries
            .iter()
            .any(|e| &e.container == container && strip_markup(&e.fields.front) == key);
        if duplicate {
            return Ok(CreateOutcome::DuplicateRejected);
        }

        let id = EntryId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(StoredEntry {
            id,
            container: container.clone(),
            fields: fields.clone(),
            tags: tags.to_vec(),
        });
        Ok(CreateOutcome::Created(id))
    }

    async fn update_entry(&self, id: EntryId, fields: &NoteFields) -> Result<()> {
        let mut inner = self.exchange("updateNoteFields")?;
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::store("updateNoteFields", format!("note was not found: {}", id)))?;
        entry.fields = fields.clone();
        Ok(())
    }

    async fn store_media(&self, filename: &str, data: &[u8]) -> Result<String> {
        let mut inner = self.exchange("storeMediaFile")?;
        if inner.failing_uploads.contains(filename) {
            return Err(Error::StoreUnavailable(
                "storeMediaFile timed out: injected failure".to_string(),
            ));
        }
        let stored = inner
            .media_names
            .get(filename)
            .cloned()
            .unwrap_or_else(|| filename.to_string());
        inner.media.insert(stored.clone(), data.to_vec());
        Ok(stored)
    }

    async fn find_media(&self, pattern: &str) -> Result<Vec<String>> {
        let inner = self.exchange("getMediaFilesNames")?;
        let pattern = Pattern::new(pattern)
            .map_err(|e| Error::store("getMediaFilesNames", format!("bad pattern: {}", e)))?;
        let mut names: Vec<String> = inner
            .media
            .keys()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn container_names(&self) -> Result<Vec<String>> {
        let inner = self.exchange("deckNames")?;
        Ok(inner.containers.iter().map(|c| c.to_string()).collect())
    }
}
