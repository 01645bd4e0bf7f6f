//! decksync Sync Engine
//!
//! This module turns language-learning content into flashcards in a remote
//! note store, including:
//! - Fixed card layouts per content type
//! - Container-level skip policy and per-card duplicate detection
//! - Run-wide media caching with reuse of files already in the store
//! - Batch orchestration with per-entry failure isolation

pub mod card;
pub mod config;
pub mod engine;
pub mod media;
pub mod orchestrator;
pub mod registry;
pub mod render;
pub mod source;
pub mod state;

// Re-export main types
pub use card::{CardContent, CardMedia, CardSide, StagedMedia};
pub use config::SyncSettings;
pub use engine::SyncEngine;
pub use media::MediaStager;
pub use orchestrator::BatchOrchestrator;
pub use registry::{
    BatchFilter, BatchPlan, ContentRegistry, ContentType, ContentTypeSpec, DedupPolicy,
    LanguageSpec,
};
pub use render::render_card;
pub use source::{CsvSourceLoader, SourceLoader};
pub use state::{
    BatchReport, BatchStatus, ContainerLedger, ContainerReport, ContainerState, EntryReport,
    OutcomeCounts, RunSummary, SyncOutcome,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _settings = SyncSettings::default();
        let _registry = ContentRegistry::default();
        let _policy = DedupPolicy::default();
        let _ledger = ContainerLedger::new();
    }
}
