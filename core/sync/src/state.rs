//! Container states, per-entry outcomes and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use decksync_common::{ContainerPath, Error, Result};

use crate::registry::{BatchPlan, ContentType};

/// Where a container is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    /// Not looked at yet.
    Unchecked,
    /// Population checked.
    Probed,
    /// Left alone because it was already populated.
    Skipped,
    /// Entries are being written.
    Building,
    /// All entries processed.
    Done,
}

impl ContainerState {
    /// Whether the container is finished for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerState::Skipped | ContainerState::Done)
    }
}

/// What happened to one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum SyncOutcome {
    /// A new entry was created.
    Created,
    /// An existing entry was overwritten.
    Updated,
    /// An equal entry already exists or the card repeats an earlier one.
    SkippedDuplicate,
    /// The container was already populated.
    SkippedContainerPopulated,
    /// The card could not be synced.
    Failed(String),
}

impl SyncOutcome {
    /// Short label for logs and tables.
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::SkippedDuplicate => "skipped-duplicate",
            SyncOutcome::SkippedContainerPopulated => "skipped-container-populated",
            SyncOutcome::Failed(_) => "failed",
        }
    }

    /// Whether this is one of the skip outcomes.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SyncOutcome::SkippedDuplicate | SyncOutcome::SkippedContainerPopulated
        )
    }
}

/// Outcome of one card, keyed by its identity when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    /// Card identity; absent when the card could not be rendered.
    pub front_key: Option<String>,
    /// What happened.
    pub outcome: SyncOutcome,
}

/// How a batch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum BatchStatus {
    /// Every card was processed.
    Done,
    /// The container was populated and skip policy applied.
    Skipped,
    /// The container was already finished earlier in the run.
    AlreadyVisited,
    /// The source could not be loaded.
    SourceFailed(String),
    /// The container could not be probed or created.
    StoreFailed(String),
}

impl BatchStatus {
    /// Short label for tables.
    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Done => "done",
            BatchStatus::Skipped => "skipped",
            BatchStatus::AlreadyVisited => "already visited",
            BatchStatus::SourceFailed(_) => "source failed",
            BatchStatus::StoreFailed(_) => "store failed",
        }
    }

    /// Whether the batch as a whole failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, BatchStatus::SourceFailed(_) | BatchStatus::StoreFailed(_))
    }
}

/// Result of running the engine over one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReport {
    /// Container synced.
    pub container: ContainerPath,
    /// How it ended.
    pub status: BatchStatus,
    /// Per-card outcomes in source order.
    pub entries: Vec<EntryReport>,
}

/// Counts of outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    /// Entries created.
    pub created: usize,
    /// Entries updated.
    pub updated: usize,
    /// Cards skipped for any reason.
    pub skipped: usize,
    /// Cards that failed.
    pub failed: usize,
}

impl OutcomeCounts {
    fn add(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Created => self.created += 1,
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::SkippedDuplicate | SyncOutcome::SkippedContainerPopulated => {
                self.skipped += 1
            }
            SyncOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: OutcomeCounts) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Result of one (language, content type) batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Language display name.
    pub language: String,
    /// Content type.
    pub content_type: ContentType,
    /// Target container.
    pub container: ContainerPath,
    /// How the batch ended.
    pub status: BatchStatus,
    /// Per-card outcomes in source order.
    pub entries: Vec<EntryReport>,
}

impl BatchReport {
    /// Report for a batch the engine ran.
    pub fn from_container(plan: &BatchPlan, report: ContainerReport) -> Self {
        Self {
            language: plan.language.clone(),
            content_type: plan.spec.content_type,
            container: report.container,
            status: report.status,
            entries: report.entries,
        }
    }

    /// Report for a batch whose source failed to load.
    pub fn source_failed(plan: &BatchPlan, error: &Error) -> Self {
        Self {
            language: plan.language.clone(),
            content_type: plan.spec.content_type,
            container: plan.container.clone(),
            status: BatchStatus::SourceFailed(error.to_string()),
            entries: Vec::new(),
        }
    }

    /// Outcome counts.
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for entry in &self.entries {
            counts.add(&entry.outcome);
        }
        counts
    }

    /// Whether any card or the batch itself failed.
    pub fn has_failures(&self) -> bool {
        self.status.is_failure()
            || self
                .entries
                .iter()
                .any(|e| matches!(e.outcome, SyncOutcome::Failed(_)))
    }

    /// Failed cards with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&EntryReport, &str)> {
        self.entries.iter().filter_map(|e| match &e.outcome {
            SyncOutcome::Failed(reason) => Some((e, reason.as_str())),
            _ => None,
        })
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Batches in registry order.
    pub batches: Vec<BatchReport>,
}

impl RunSummary {
    /// Totals over all batches.
    pub fn totals(&self) -> OutcomeCounts {
        let mut totals = OutcomeCounts::default();
        for batch in &self.batches {
            totals.merge(batch.counts());
        }
        totals
    }

    /// Whether any batch or card failed.
    pub fn has_failures(&self) -> bool {
        self.batches.iter().any(|b| b.has_failures())
    }

    /// Human-readable table of per-container counts.
    pub fn render_table(&self) -> String {
        let width = self
            .batches
            .iter()
            .map(|b| b.container.to_string().chars().count())
            .max()
            .unwrap_or(0)
            .max("Container".len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:>7}  {:>7}  {:>6}  {}",
            "Container", "created", "updated", "skipped", "failed", "status"
        );
        for batch in &self.batches {
            let c = batch.counts();
            let _ = writeln!(
                out,
                "{:<width$}  {:>7}  {:>7}  {:>7}  {:>6}  {}",
                batch.container.to_string(),
                c.created,
                c.updated,
                c.skipped,
                c.failed,
                batch.status.label()
            );
        }
        let t = self.totals();
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:>7}  {:>7}  {:>6}",
            "Total", t.created, t.updated, t.skipped, t.failed
        );
        let elapsed = self.finished_at - self.started_at;
        let _ = write!(
            out,
            "Finished in {}.{:03}s",
            elapsed.num_seconds(),
            elapsed.num_milliseconds().rem_euclid(1000)
        );
        out
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Per-run record of container states.
#[derive(Debug, Clone, Default)]
pub struct ContainerLedger {
    states: HashMap<ContainerPath, ContainerState>,
}

impl ContainerLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a container.
    pub fn state(&self, container: &ContainerPath) -> ContainerState {
        self.states
            .get(container)
            .copied()
            .unwrap_or(ContainerState::Unchecked)
    }

    /// Claim a container for processing.
    ///
    /// Returns false if the container is already in progress or finished.
    pub fn claim(&mut self, container: &ContainerPath) -> bool {
        if self.state(container) != ContainerState::Unchecked {
            return false;
        }
        self.states
            .insert(container.clone(), ContainerState::Probed);
        true
    }

    /// Move a claimed container to a new state.
    pub fn set(&mut self, container: &ContainerPath, state: ContainerState) {
        self.states.insert(container.clone(), state);
    }
}
