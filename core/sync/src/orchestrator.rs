//! Runs every configured batch through the engine.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use decksync_common::Result;

use crate::engine::SyncEngine;
use crate::registry::{BatchFilter, BatchPlan, ContentRegistry, DedupPolicy};
use crate::render::render_card;
use crate::source::SourceLoader;
use crate::state::{BatchReport, RunSummary};

/// Feeds (language, content type) batches to the engine and collects a summary.
pub struct BatchOrchestrator {
    engine: Arc<SyncEngine>,
    loader: Arc<dyn SourceLoader>,
    defaults: DedupPolicy,
    parallel_batches: usize,
    filter: BatchFilter,
}

impl BatchOrchestrator {
    /// Create an orchestrator running one batch at a time.
    pub fn new(engine: Arc<SyncEngine>, loader: Arc<dyn SourceLoader>, defaults: DedupPolicy) -> Self {
        Self {
            engine,
            loader,
            defaults,
            parallel_batches: 1,
            filter: BatchFilter::default(),
        }
    }

    /// Run up to `n` containers at once. Reports keep registry order.
    pub fn with_parallel_batches(mut self, n: usize) -> Self {
        self.parallel_batches = n.max(1);
        self
    }

    /// Restrict the run to some languages or content types.
    pub fn with_filter(mut self, filter: BatchFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Run every batch of the registry.
    ///
    /// Batch failures are recorded in the summary and never stop the run.
    ///
    /// # Errors
    /// - The registry yields an invalid container path
    pub async fn run(&self, registry: &ContentRegistry) -> Result<RunSummary> {
        let started_at = Utc::now();
        let plans = registry.plan(&self.filter)?;
        info!(
            "Starting run: {} batches against {}",
            plans.len(),
            self.engine.store().name()
        );

        let batches: Vec<BatchReport> = stream::iter(plans)
            .map(|plan| async move { self.run_batch(plan).await })
            .buffered(self.parallel_batches)
            .collect()
            .await;

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            batches,
        };
        let totals = summary.totals();
        info!(
            "Run finished: {} created, {} updated, {} skipped, {} failed",
            totals.created, totals.updated, totals.skipped, totals.failed
        );
        Ok(summary)
    }

    async fn run_batch(&self, plan: BatchPlan) -> BatchReport {
        info!("Processing {} ({})", plan.container, plan.spec.file);

        let records = match self.loader.load(&plan.spec).await {
            Ok(records) => records,
            Err(e) if e.is_batch_fatal() => {
                warn!("Skipping {}: {}", plan.container, e);
                return BatchReport::source_failed(&plan, &e);
            }
            Err(e) => {
                error!("Could not read source for {}: {}", plan.container, e);
                return BatchReport::source_failed(&plan, &e);
            }
        };

        let tags = plan.tags();
        let cards = records
            .iter()
            .map(|record| render_card(plan.spec.content_type, record, &plan.language_code, &tags))
            .collect();

        let report = self
            .engine
            .sync_container(&plan.container, cards, plan.spec.policy(self.defaults))
            .await;
        BatchReport::from_container(&plan, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaStager;
    use crate::registry::{ContentType, ContentTypeSpec, LanguageSpec};
    use crate::source::CsvSourceLoader;
    use crate::state::{BatchStatus, SyncOutcome};
    use decksync_common::ContainerPath;
    use decksync_media::MediaResolver;
    use decksync_store::{MemoryStore, NoteFields};
    use tempfile::TempDir;

    const IPA_HEADER: &str = "ipa,description,example_word,english_translation,word_ipa\n";

    async fn write(dir: &TempDir, folder: &str, file: &str, body: &str) {
        let folder = dir.path().join(folder);
        tokio::fs::create_dir_all(&folder).await.unwrap();
        tokio::fs::write(folder.join(file), body).await.unwrap();
    }

    fn orchestrator(store: Arc<MemoryStore>, dir: &TempDir, defaults: DedupPolicy) -> BatchOrchestrator {
        let engine = Arc::new(SyncEngine::new(
            store,
            Arc::new(MediaStager::new(MediaResolver::disabled())),
        ));
        BatchOrchestrator::new(engine, Arc::new(CsvSourceLoader::new(dir.path())), defaults)
    }

    fn registry() -> ContentRegistry {
        ContentRegistry::new(vec![
            LanguageSpec::standard("French", "fr", "fr"),
            LanguageSpec::standard("Spanish", "es", "es"),
        ])
    }

    async fn french_ipa(dir: &TempDir) {
        write(
            dir,
            "ipa_card_data",
            "fr_ipa_cards.csv",
            &format!("{}ʃ,sh,chat,cat,/ʃa/\nu,oo,vous,you,/vu/\nʃ,sh again,chien,dog,/ʃjɛ̃/\n", IPA_HEADER),
        )
        .await;
    }

    #[tokio::test]
    async fn test_run_continues_past_missing_sources() {
        let dir = TempDir::new().unwrap();
        french_ipa(&dir).await;
        let store = Arc::new(MemoryStore::new());

        let summary = orchestrator(store.clone(), &dir, DedupPolicy::default())
            .run(&registry())
            .await
            .unwrap();

        let statuses: Vec<(String, &BatchStatus)> = summary
            .batches
            .iter()
            .map(|b| (b.container.to_string(), &b.status))
            .collect();
        assert_eq!(statuses.len(), 4);
        assert_eq!(statuses[0], ("French::IPA".to_string(), &BatchStatus::Done));
        assert!(matches!(statuses[1].1, BatchStatus::SourceFailed(_)));
        assert!(matches!(statuses[2].1, BatchStatus::SourceFailed(_)));
        assert!(matches!(statuses[3].1, BatchStatus::SourceFailed(_)));

        let totals = summary.totals();
        assert_eq!(totals.created, 2);
        assert_eq!(totals.skipped, 1);
        assert!(summary.has_failures());

        let container = ContainerPath::parse("French::IPA").unwrap();
        let entries = store.entries_in(&container);
        assert_eq!(entries[0].tags, vec!["french", "ipa"]);
        assert_eq!(entries[0].fields.front, "<big>ʃ</big>");
    }

    #[tokio::test]
    async fn test_second_run_skips_populated_containers() {
        let dir = TempDir::new().unwrap();
        french_ipa(&dir).await;
        let store = Arc::new(MemoryStore::new());
        let filter = BatchFilter {
            languages: vec!["fr".to_string()],
            content_types: vec![ContentType::Ipa],
        };

        orchestrator(store.clone(), &dir, DedupPolicy::default())
            .with_filter(filter.clone())
            .run(&registry())
            .await
            .unwrap();
        let summary = orchestrator(store.clone(), &dir, DedupPolicy::default())
            .with_filter(filter)
            .run(&registry())
            .await
            .unwrap();

        assert_eq!(summary.batches.len(), 1);
        assert_eq!(summary.batches[0].status, BatchStatus::Skipped);
        assert_eq!(summary.totals().created, 0);
        assert!(!summary.has_failures());
        assert_eq!(store.calls("addNote"), 2);
    }

    #[tokio::test]
    async fn test_per_type_policy_override() {
        let dir = TempDir::new().unwrap();
        write(&dir, "vocabulary", "fr_vocab.csv", "word,translation\nchat,kitty\n").await;
        let store = Arc::new(MemoryStore::new());
        let container = ContainerPath::parse("French::Basic Vocabulary").unwrap();
        store.seed_entry(&container, NoteFields::new("chat", "<b>cat</b>"));

        let mut vocab = ContentTypeSpec::new(ContentType::Vocabulary, "fr_vocab.csv");
        vocab.skip_populated = Some(false);
        vocab.update_existing = Some(true);
        let registry = ContentRegistry::new(vec![LanguageSpec {
            name: "French".to_string(),
            code: "fr".to_string(),
            content: vec![vocab],
        }]);

        let summary = orchestrator(store.clone(), &dir, DedupPolicy::default())
            .run(&registry)
            .await
            .unwrap();

        assert_eq!(summary.batches[0].entries[0].outcome, SyncOutcome::Updated);
        assert_eq!(store.entries_in(&container)[0].fields.back, "<b>kitty</b>");
    }

    #[tokio::test]
    async fn test_parallel_batches_keep_registry_order() {
        let dir = TempDir::new().unwrap();
        french_ipa(&dir).await;
        write(
            &dir,
            "ipa_card_data",
            "es_ipa_cards.csv",
            &format!("{}x,j,jamón,ham,/xaˈmon/\n", IPA_HEADER),
        )
        .await;
        let store = Arc::new(MemoryStore::new());
        let filter = BatchFilter {
            languages: Vec::new(),
            content_types: vec![ContentType::Ipa],
        };

        let summary = orchestrator(store.clone(), &dir, DedupPolicy::default())
            .with_parallel_batches(4)
            .with_filter(filter)
            .run(&registry())
            .await
            .unwrap();

        let containers: Vec<String> = summary.batches.iter().map(|b| b.container.to_string()).collect();
        assert_eq!(containers, vec!["French::IPA", "Spanish::IPA"]);
        assert_eq!(summary.totals().created, 3);
    }

    #[tokio::test]
    async fn test_missing_columns_skip_batch() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ipa_card_data", "fr_ipa_cards.csv", "ipa,description\nʃ,sh\n").await;
        let store = Arc::new(MemoryStore::new());

        let summary = orchestrator(store.clone(), &dir, DedupPolicy::default())
            .with_filter(BatchFilter {
                languages: vec!["French".to_string()],
                content_types: vec![ContentType::Ipa],
            })
            .run(&registry())
            .await
            .unwrap();

        match &summary.batches[0].status {
            BatchStatus::SourceFailed(reason) => assert!(reason.contains("Missing columns")),
            other => panic!("unexpected status: {other:?}"),
        }
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_source_fails_only_its_batch() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "ipa_card_data",
            "fr_ipa_cards.csv",
            &format!("{}ʃ,sh\n", IPA_HEADER),
        )
        .await;
        write(
            &dir,
            "ipa_card_data",
            "es_ipa_cards.csv",
            &format!("{}x,j,jamón,ham,/xaˈmon/\n", IPA_HEADER),
        )
        .await;
        let store = Arc::new(MemoryStore::new());

        let summary = orchestrator(store.clone(), &dir, DedupPolicy::default())
            .with_filter(BatchFilter {
                languages: Vec::new(),
                content_types: vec![ContentType::Ipa],
            })
            .run(&registry())
            .await
            .unwrap();

        assert!(matches!(summary.batches[0].status, BatchStatus::SourceFailed(_)));
        assert_eq!(summary.batches[1].status, BatchStatus::Done);
        assert_eq!(summary.totals().created, 1);
    }
}
