//! decksync CLI - Command line interface for flashcard synchronization.
//!
//! This tool loads language-learning content, renders it as cards and
//! writes it into Anki through AnkiConnect, with generated audio and
//! looked-up images.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use decksync_media::{ImageService, MediaResolver, SpeechService};
use decksync_store::{AnkiConnectStore, MemoryStore, NoteStore};
use decksync_sync::{
    BatchFilter, BatchOrchestrator, BatchStatus, ContentType, CsvSourceLoader, MediaStager,
    SourceLoader, SyncEngine, SyncSettings,
};

#[derive(Parser)]
#[command(name = "decksync")]
#[command(about = "decksync - Sync language-learning decks into Anki")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: <config dir>/decksync/config.json if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// AnkiConnect endpoint.
    #[arg(short, long, global = true, env = "ANKICONNECT_URL")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every configured batch into the store.
    Sync(SyncArgs),

    /// Check that the store is reachable.
    Check,

    /// List configured batches and whether their sources exist.
    List {
        /// Directory holding the source folders.
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Also list the store's existing decks.
        #[arg(long)]
        decks: bool,
    },

    /// Print the effective settings as JSON.
    Config,
}

#[derive(Args)]
struct SyncArgs {
    /// Directory holding the source folders.
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Pixabay API key; images are skipped without one.
    #[arg(long, env = "PIXABAY_API_KEY", hide_env_values = true)]
    image_api_key: Option<String>,

    /// Only sync these languages (name or code).
    #[arg(short, long = "language")]
    languages: Vec<String>,

    /// Only sync these content types ("ipa", "rules", "vocabulary").
    #[arg(short = 't', long = "content-type")]
    content_types: Vec<ContentType>,

    /// Overwrite existing entries instead of skipping them.
    #[arg(short, long)]
    update: bool,

    /// Sync into containers that already have entries.
    #[arg(long)]
    no_skip_populated: bool,

    /// Do not fetch images.
    #[arg(long)]
    no_images: bool,

    /// Do not generate audio.
    #[arg(long)]
    no_audio: bool,

    /// Number of containers synced at once.
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Run against an in-memory store with media disabled.
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(endpoint) = cli.endpoint {
        settings.store_endpoint = endpoint;
    }

    match cli.command {
        Commands::Sync(args) => cmd_sync(settings, args).await,
        Commands::Check => cmd_check(&settings).await,
        Commands::List { data_dir, decks } => {
            if let Some(dir) = data_dir {
                settings.data_dir = dir;
            }
            cmd_list(&settings, decks).await
        }
        Commands::Config => {
            println!("{}", settings.to_json()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load settings from an explicit file, the default location, or defaults.
fn load_settings(path: Option<&Path>) -> Result<SyncSettings> {
    if let Some(path) = path {
        return SyncSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }

    let default_path = dirs::config_dir().map(|dir| dir.join("decksync").join("config.json"));
    match default_path {
        Some(path) if path.is_file() => {
            info!("Using settings from {}", path.display());
            SyncSettings::load(&path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))
        }
        _ => Ok(SyncSettings::default()),
    }
}

fn connect(settings: &SyncSettings) -> Result<AnkiConnectStore> {
    AnkiConnectStore::new(settings.store_config()).context("Failed to create AnkiConnect client")
}

/// Run a full sync.
async fn cmd_sync(mut settings: SyncSettings, args: SyncArgs) -> Result<ExitCode> {
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }
    if args.image_api_key.is_some() {
        settings.image_api_key = args.image_api_key;
    }
    if args.update {
        settings.update_existing = true;
    }
    if args.no_skip_populated {
        settings.skip_populated_containers = false;
    }
    if args.no_images {
        settings.image_service = ImageService::None;
    }
    if args.no_audio {
        settings.speech_service = SpeechService::None;
    }
    if let Some(n) = args.parallel {
        settings.parallel_batches = n;
    }
    settings.validate().context("Invalid settings")?;

    let (store, resolver): (Arc<dyn NoteStore>, MediaResolver) = if args.dry_run {
        info!("Dry run: using an in-memory store, media disabled");
        (Arc::new(MemoryStore::new()), MediaResolver::disabled())
    } else {
        let store = connect(&settings)?;
        let version = store
            .version()
            .await
            .with_context(|| format!("AnkiConnect not reachable at {}", store.endpoint()))?;
        info!("Connected to AnkiConnect v{} at {}", version, store.endpoint());
        let resolver = MediaResolver::from_config(&settings.media_config())
            .context("Failed to set up media services")?;
        (Arc::new(store), resolver)
    };

    let engine = Arc::new(SyncEngine::new(store, Arc::new(MediaStager::new(resolver))));
    let loader = Arc::new(CsvSourceLoader::new(&settings.data_dir));
    let orchestrator = BatchOrchestrator::new(engine, loader, settings.dedup_policy())
        .with_parallel_batches(settings.parallel_batches)
        .with_filter(BatchFilter {
            languages: args.languages,
            content_types: args.content_types,
        });

    let summary = orchestrator
        .run(&settings.registry())
        .await
        .context("Sync failed")?;

    if args.json {
        println!("{}", summary.to_json()?);
    } else {
        println!("{}", summary.render_table());
        for batch in &summary.batches {
            if let BatchStatus::SourceFailed(reason) | BatchStatus::StoreFailed(reason) =
                &batch.status
            {
                println!("  {}: {}", batch.container, reason);
            }
            for (entry, reason) in batch.failures() {
                println!(
                    "  {} '{}': {}",
                    batch.container,
                    entry.front_key.as_deref().unwrap_or("<unrendered>"),
                    reason
                );
            }
        }
    }

    if summary.has_failures() {
        warn!("Run finished with failures");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Check store reachability.
async fn cmd_check(settings: &SyncSettings) -> Result<ExitCode> {
    let store = connect(settings)?;
    match store.version().await {
        Ok(version) => {
            println!("AnkiConnect reachable at {}", store.endpoint());
            println!("  Protocol version: {}", version);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("AnkiConnect not reachable at {}: {}", store.endpoint(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// List configured batches and source availability.
async fn cmd_list(settings: &SyncSettings, decks: bool) -> Result<ExitCode> {
    let loader = CsvSourceLoader::new(&settings.data_dir);
    let plans = settings
        .registry()
        .plan(&BatchFilter::default())
        .context("Invalid registry")?;

    println!("Batches (data dir: {}):", settings.data_dir.display());
    for plan in &plans {
        let marker = if loader.exists(&plan.spec).await {
            "ok"
        } else {
            "missing"
        };
        println!(
            "  [{:<7}] {} <- {}",
            marker,
            plan.container,
            loader.path_for(&plan.spec).display()
        );
    }

    if decks {
        let store = connect(settings)?;
        let names = store
            .container_names()
            .await
            .context("Failed to list decks")?;
        println!("Decks in store:");
        for name in names {
            println!("  {}", name);
        }
    }

    Ok(ExitCode::SUCCESS)
}
