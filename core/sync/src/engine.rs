//! Core sync engine that writes content batches into the store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use decksync_common::{ContainerPath, Result};
use decksync_store::{CreateOutcome, EntryQuery, NoteStore};

use crate::card::{CardContent, StagedMedia};
use crate::media::MediaStager;
use crate::registry::DedupPolicy;
use crate::state::{
    BatchStatus, ContainerLedger, ContainerReport, ContainerState, EntryReport, SyncOutcome,
};

/// Writes cards into containers, at most once per card identity.
///
/// Each container moves through `Unchecked -> Probed -> Skipped | Building
/// -> Done` and is visited at most once per engine. Cards of a container are
/// processed strictly in order; a failing card never stops the cards after it.
pub struct SyncEngine {
    /// Remote store.
    store: Arc<dyn NoteStore>,
    /// Media cache shared by all batches.
    media: Arc<MediaStager>,
    /// Container states for this run.
    ledger: Mutex<ContainerLedger>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(store: Arc<dyn NoteStore>, media: Arc<MediaStager>) -> Self {
        Self {
            store,
            media,
            ledger: Mutex::new(ContainerLedger::new()),
        }
    }

    /// Store this engine writes to.
    pub fn store(&self) -> &Arc<dyn NoteStore> {
        &self.store
    }

    /// Current state of a container.
    pub fn container_state(&self, container: &ContainerPath) -> ContainerState {
        self.ledger().state(container)
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, ContainerLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, container: &ContainerPath, state: ContainerState) {
        debug!("{} -> {:?}", container, state);
        self.ledger().set(container, state);
    }

    /// Sync one container's cards.
    ///
    /// `cards` are in source order; an `Err` item is a card that could not be
    /// rendered and is reported as failed.
    pub async fn sync_container(
        &self,
        container: &ContainerPath,
        cards: Vec<Result<CardContent>>,
        policy: DedupPolicy,
    ) -> ContainerReport {
        if !self.ledger().claim(container) {
            info!("Container {} already visited in this run", container);
            return ContainerReport {
                container: container.clone(),
                status: BatchStatus::AlreadyVisited,
                entries: Vec::new(),
            };
        }

        if policy.skip_populated {
            match self.store.container_has_entries(container).await {
                Ok(true) => {
                    info!("Skipping {}: already has entries", container);
                    self.transition(container, ContainerState::Skipped);
                    let entries = cards
                        .iter()
                        .map(|card| EntryReport {
                            front_key: card.as_ref().ok().map(|c| c.front_key.clone()),
                            outcome: SyncOutcome::SkippedContainerPopulated,
                        })
                        .collect();
                    return ContainerReport {
                        container: container.clone(),
                        status: BatchStatus::Skipped,
                        entries,
                    };
                }
                Ok(false) => {}
                Err(e) => return self.abandon(container, &cards, e.to_string()),
            }
        }

        self.transition(container, ContainerState::Building);
        if let Err(e) = self.store.ensure_container(container).await {
            return self.abandon(container, &cards, e.to_string());
        }

        info!("Building {} ({} cards)", container, cards.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut entries = Vec::with_capacity(cards.len());

        for card in cards {
            let report = match card {
                Ok(card) => {
                    let outcome = if seen.insert(card.front_key.clone()) {
                        self.sync_entry(container, &card, policy)
                            .await
                            .unwrap_or_else(|e| SyncOutcome::Failed(e.to_string()))
                    } else {
                        debug!("Repeated card '{}' in {}", card.front_key, container);
                        SyncOutcome::SkippedDuplicate
                    };
                    EntryReport {
                        front_key: Some(card.front_key),
                        outcome,
                    }
                }
                Err(e) => EntryReport {
                    front_key: None,
                    outcome: SyncOutcome::Failed(e.to_string()),
                },
            };

            match &report.outcome {
                SyncOutcome::Failed(reason) => error!(
                    "Failed '{}' in {}: {}",
                    report.front_key.as_deref().unwrap_or("<unrendered>"),
                    container,
                    reason
                ),
                outcome => debug!(
                    "{} '{}'",
                    outcome.label(),
                    report.front_key.as_deref().unwrap_or_default()
                ),
            }
            entries.push(report);
        }

        self.transition(container, ContainerState::Done);
        ContainerReport {
            container: container.clone(),
            status: BatchStatus::Done,
            entries,
        }
    }

    /// Give up on a container the store could not probe or create.
    fn abandon(
        &self,
        container: &ContainerPath,
        cards: &[Result<CardContent>],
        reason: String,
    ) -> ContainerReport {
        error!("Cannot sync {}: {}", container, reason);
        self.transition(container, ContainerState::Done);
        let entries = cards
            .iter()
            .map(|card| EntryReport {
                front_key: card.as_ref().ok().map(|c| c.front_key.clone()),
                outcome: SyncOutcome::Failed(reason.clone()),
            })
            .collect();
        ContainerReport {
            container: container.clone(),
            status: BatchStatus::StoreFailed(reason),
            entries,
        }
    }

    /// Sync a single card: stage media, then update, skip or create.
    async fn sync_entry(
        &self,
        container: &ContainerPath,
        card: &CardContent,
        policy: DedupPolicy,
    ) -> Result<SyncOutcome> {
        let mut staged = Vec::new();
        for item in &card.media {
            if let Some(media) = self.media.stage(&item.request, self.store.as_ref()).await? {
                staged.push(StagedMedia {
                    side: item.side,
                    media,
                });
            }
        }
        let fields = card.embed(&staged);

        let query = if card.has_front_media() {
            EntryQuery::prefix(container.clone(), card.front_key.clone())
        } else {
            EntryQuery::exact(container.clone(), card.front_key.clone())
        };
        let existing = self.store.find_entries(&query).await?;

        if let Some(id) = existing.first() {
            if !policy.update_existing {
                return Ok(SyncOutcome::SkippedDuplicate);
            }
            self.store.update_entry(*id, &fields).await?;
            return Ok(SyncOutcome::Updated);
        }

        match self.store.create_entry(container, &fields, &card.tags).await? {
            CreateOutcome::Created(id) => {
                debug!("Created entry {} in {}", id, container);
                Ok(SyncOutcome::Created)
            }
            CreateOutcome::DuplicateRejected => Ok(SyncOutcome::SkippedDuplicate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use decksync_common::{EntryId, Error};
    use decksync_media::{
        ImageSource, LocatedMedia, MediaArtifact, MediaKind, MediaOrigin, MediaRequest,
        MediaResolver, SpeechSynthesizer,
    };
    use decksync_store::{MemoryStore, NoteFields};

    struct EchoSpeech;

    #[async_trait]
    impl SpeechSynthesizer for EchoSpeech {
        fn name(&self) -> &str {
            "echo"
        }

        async fn synthesize(&self, text: &str, _language: &str) -> Result<Bytes> {
            Ok(Bytes::from(text.as_bytes().to_vec()))
        }
    }

    /// Finds an image for every query except "nothing"; "broken" fails.
    struct StubImages;

    #[async_trait]
    impl ImageSource for StubImages {
        fn name(&self) -> &str {
            "stub"
        }

        async fn locate(&self, query: &str) -> Result<Option<LocatedMedia>> {
            match query {
                "nothing" => Ok(None),
                "broken" => Err(Error::MediaResolution("search timed out".to_string())),
                _ => Ok(Some(LocatedMedia {
                    kind: MediaKind::Image,
                    filename: format!("{}.jpg", query),
                    origin: MediaOrigin::Download {
                        url: format!("https://img.test/{}.jpg", query),
                    },
                })),
            }
        }

        async fn fetch(&self, located: &LocatedMedia) -> Result<MediaArtifact> {
            Ok(MediaArtifact {
                kind: MediaKind::Image,
                filename: located.filename.clone(),
                data: Bytes::from(vec![0u8; 600]),
            })
        }
    }

    fn engine_with(store: Arc<MemoryStore>, resolver: MediaResolver) -> SyncEngine {
        SyncEngine::new(store, Arc::new(MediaStager::new(resolver)))
    }

    fn engine(store: Arc<MemoryStore>) -> SyncEngine {
        engine_with(store, MediaResolver::disabled())
    }

    fn media_engine(store: Arc<MemoryStore>) -> SyncEngine {
        engine_with(
            store,
            MediaResolver::new(Some(Arc::new(StubImages)), Some(Arc::new(EchoSpeech))),
        )
    }

    fn deck(path: &str) -> ContainerPath {
        ContainerPath::parse(path).unwrap()
    }

    fn card(front: &str, back: &str) -> Result<CardContent> {
        Ok(CardContent::new(front, back).with_tags(vec!["french".to_string()]))
    }

    fn illustrated(front: &str, image: &str) -> Result<CardContent> {
        Ok(CardContent::new(front, format!("<b>{}</b>", front))
            .with_back_media(MediaRequest::image(image))
            .with_back_media(MediaRequest::audio(front, "fr")))
    }

    fn outcomes(report: &ContainerReport) -> Vec<SyncOutcome> {
        report.entries.iter().map(|e| e.outcome.clone()).collect()
    }

    const BUILD: DedupPolicy = DedupPolicy {
        skip_populated: false,
        update_existing: false,
    };

    #[tokio::test]
    async fn test_creates_entries_in_order() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::IPA");

        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "1"), card("b", "2")], BUILD)
            .await;

        assert_eq!(report.status, BatchStatus::Done);
        assert_eq!(outcomes(&report), vec![SyncOutcome::Created, SyncOutcome::Created]);
        let stored: Vec<String> = store
            .entries_in(&container)
            .iter()
            .map(|e| e.fields.front.clone())
            .collect();
        assert_eq!(stored, vec!["a", "b"]);
        assert_eq!(store.entries_in(&container)[0].tags, vec!["french"]);
    }

    #[tokio::test]
    async fn test_rerun_creates_nothing() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::IPA");
        let cards = || vec![card("a", "1"), card("b", "2")];

        engine(store.clone()).sync_container(&container, cards(), BUILD).await;
        let report = engine(store.clone()).sync_container(&container, cards(), BUILD).await;

        assert_eq!(
            outcomes(&report),
            vec![SyncOutcome::SkippedDuplicate, SyncOutcome::SkippedDuplicate]
        );
        assert_eq!(store.calls("addNote"), 2);
    }

    #[tokio::test]
    async fn test_rerun_with_update_rewrites_fields() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::IPA");
        let update = DedupPolicy {
            skip_populated: false,
            update_existing: true,
        };

        engine(store.clone())
            .sync_container(&container, vec![card("a", "old")], BUILD)
            .await;
        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "new")], update)
            .await;

        assert_eq!(outcomes(&report), vec![SyncOutcome::Updated]);
        let entries = store.entries_in(&container);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields, NoteFields::new("a", "new"));
    }

    #[tokio::test]
    async fn test_repeated_front_key_never_reaches_store() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("Spanish::IPA");

        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "1"), card("a", "2")], BUILD)
            .await;

        assert_eq!(
            outcomes(&report),
            vec![SyncOutcome::Created, SyncOutcome::SkippedDuplicate]
        );
        assert_eq!(store.calls("findNotes"), 1);
        assert_eq!(store.calls("addNote"), 1);
    }

    #[tokio::test]
    async fn test_populated_container_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("German::IPA");
        store.seed_entry(&container, NoteFields::new("x", "y"));

        let engine = engine(store.clone());
        let report = engine
            .sync_container(&container, vec![card("a", "1"), card("b", "2")], DedupPolicy::default())
            .await;

        assert_eq!(report.status, BatchStatus::Skipped);
        assert_eq!(
            outcomes(&report),
            vec![
                SyncOutcome::SkippedContainerPopulated,
                SyncOutcome::SkippedContainerPopulated
            ]
        );
        assert_eq!(store.calls("addNote"), 0);
        assert_eq!(store.calls("updateNoteFields"), 0);
        assert_eq!(store.calls("createDeck"), 0);
        assert_eq!(engine.container_state(&container), ContainerState::Skipped);
    }

    #[tokio::test]
    async fn test_empty_container_is_built_under_skip_policy() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("German::IPA");

        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "1")], DedupPolicy::default())
            .await;
        assert_eq!(outcomes(&report), vec![SyncOutcome::Created]);
        assert!(store.has_container(&container));
    }

    #[tokio::test]
    async fn test_containers_are_not_revisited() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("Russian::IPA");
        let engine = engine(store.clone());

        engine.sync_container(&container, vec![card("a", "1")], BUILD).await;
        let again = engine.sync_container(&container, vec![card("b", "2")], BUILD).await;

        assert_eq!(again.status, BatchStatus::AlreadyVisited);
        assert!(again.entries.is_empty());
        assert_eq!(store.entries_in(&container).len(), 1);
        assert_eq!(engine.container_state(&container), ContainerState::Done);
    }

    #[tokio::test]
    async fn test_media_is_embedded_image_then_audio() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::Basic Vocabulary");

        let report = media_engine(store.clone())
            .sync_container(&container, vec![illustrated("chat", "cat")], BUILD)
            .await;

        assert_eq!(outcomes(&report), vec![SyncOutcome::Created]);
        let back = &store.entries_in(&container)[0].fields.back;
        assert!(back.ends_with("<br><img src=\"cat.jpg\"><br>[sound:fr_chat.mp3]"));
        assert_eq!(store.media("fr_chat.mp3"), Some(b"chat".to_vec()));
        assert!(store.media("cat.jpg").is_some());
    }

    #[tokio::test]
    async fn test_missing_or_failed_image_degrades() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::Basic Vocabulary");

        let report = media_engine(store.clone())
            .sync_container(
                &container,
                vec![illustrated("chat", "nothing"), illustrated("chien", "broken")],
                BUILD,
            )
            .await;

        assert_eq!(outcomes(&report), vec![SyncOutcome::Created, SyncOutcome::Created]);
        for entry in store.entries_in(&container) {
            assert!(!entry.fields.back.contains("<img"));
            assert!(entry.fields.back.contains("[sound:"));
        }
    }

    #[tokio::test]
    async fn test_upload_failure_fails_only_that_entry() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::Basic Vocabulary");
        store.fail_media_upload("fr_chien.mp3");

        let report = media_engine(store.clone())
            .sync_container(
                &container,
                vec![
                    illustrated("chat", "cat"),
                    illustrated("chien", "dog"),
                    illustrated("oiseau", "bird"),
                ],
                BUILD,
            )
            .await;

        let outcomes = outcomes(&report);
        assert_eq!(outcomes[0], SyncOutcome::Created);
        assert!(matches!(outcomes[1], SyncOutcome::Failed(_)));
        assert_eq!(outcomes[2], SyncOutcome::Created);
        assert_eq!(store.entries_in(&container).len(), 2);
    }

    #[tokio::test]
    async fn test_store_duplicate_rejection_is_a_skip() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::IPA");
        store.seed_entry(&container, NoteFields::new("<big>a</big>", "old"));

        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "new")], BUILD)
            .await;

        assert_eq!(outcomes(&report), vec![SyncOutcome::SkippedDuplicate]);
        assert_eq!(store.calls("addNote"), 1);
    }

    #[tokio::test]
    async fn test_unrendered_card_is_reported_and_others_continue() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::IPA");

        let report = engine(store.clone())
            .sync_container(
                &container,
                vec![
                    Err(Error::InvalidInput("Record has no 'ipa' field".to_string())),
                    card("b", "2"),
                ],
                BUILD,
            )
            .await;

        assert_eq!(report.entries[0].front_key, None);
        assert!(matches!(report.entries[0].outcome, SyncOutcome::Failed(_)));
        assert_eq!(report.entries[1].outcome, SyncOutcome::Created);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_the_batch_entries() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let container = deck("French::IPA");

        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "1"), card("b", "2")], DedupPolicy::default())
            .await;

        assert!(matches!(report.status, BatchStatus::StoreFailed(_)));
        assert_eq!(report.entries.len(), 2);
        assert!(report
            .entries
            .iter()
            .all(|e| matches!(e.outcome, SyncOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn test_create_failure_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        store.fail_create("a");
        let container = deck("French::IPA");

        let report = engine(store.clone())
            .sync_container(&container, vec![card("a", "1"), card("b", "2")], BUILD)
            .await;

        assert!(matches!(report.entries[0].outcome, SyncOutcome::Failed(_)));
        assert_eq!(report.entries[1].outcome, SyncOutcome::Created);
    }

    #[tokio::test]
    async fn test_front_media_uses_prefix_query() {
        let store = Arc::new(MemoryStore::new());
        let container = deck("French::IPA");
        let card = || {
            Ok(CardContent::new("ʃ", "sh").with_media(
                crate::card::CardSide::Front,
                MediaRequest::audio("ʃ", "fr"),
            ))
        };

        engine_with(store.clone(), MediaResolver::new(None, Some(Arc::new(EchoSpeech))))
            .sync_container(&container, vec![card()], BUILD)
            .await;
        let entries = store.entries_in(&container);
        assert_eq!(entries[0].fields.front, "ʃ<br>[sound:fr_ʃ.mp3]");

        let report = engine(store.clone())
            .sync_container(&container, vec![card()], BUILD)
            .await;
        assert_eq!(outcomes(&report), vec![SyncOutcome::SkippedDuplicate]);
        assert_eq!(entries[0].id, EntryId(1));
    }
}
