use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sift_client::{
    DiffbotExtractor, EventRegistryProvider, ExaProvider, OpenAiChatModel, ReadableExtractor,
    ReqwestFetcher,
};
use sift_core::discovery::{DiscoveryConfig, discovery_channel};
use sift_core::models::SourceStatus;
use sift_core::source_tracker::DEFAULT_KNOWN_BAD;
use sift_core::traits::{ContentExtractor, LanguageModel, SearchProvider};
use sift_core::{
    EngineConfig, ExtractionCache, NewsSearchEngine, OutletDirectory, SourceTracker,
    SourceTrackerConfig, StatePaths,
};

#[derive(Parser)]
#[command(name = "sift", version, about = "Source-aware news aggregation")]
struct Cli {
    /// Directory holding sources.json, extraction_cache.json and outlets.json
    #[arg(long, global = true, env = "SIFT_STATE_DIR", default_value = StatePaths::DEFAULT_DIR)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search news and print candidates and story clusters as JSON
    Search {
        /// Free-text query
        query: String,

        /// LLM model used for classification and relevance filtering
        #[arg(short, long, env = "SIFT_MODEL", default_value = "gpt-4o-mini")]
        model: String,

        /// OpenAI-compatible API base URL
        #[arg(
            short,
            long,
            env = "SIFT_BASE_URL",
            default_value = "https://api.openai.com/v1"
        )]
        base_url: String,

        /// LLM API key
        #[arg(short, long, env = "SIFT_LLM_API_KEY")]
        api_key: String,

        /// Event Registry API key (wire search)
        #[arg(long, env = "EVENT_REGISTRY_API_KEY")]
        event_registry_key: Option<String>,

        /// Exa API key (neural search)
        #[arg(long, env = "EXA_API_KEY")]
        exa_key: Option<String>,

        /// Diffbot token; without one, pages are fetched and cleaned locally
        #[arg(long, env = "DIFFBOT_TOKEN")]
        diffbot_token: Option<String>,

        /// Override the number of candidates returned
        #[arg(long)]
        max_results: Option<usize>,

        /// Promote reliable unknown outlets into the outlet directory
        #[arg(long, default_value_t = false)]
        discover: bool,

        /// Allow the local extractor to fetch private/reserved addresses
        #[arg(long, default_value_t = false)]
        allow_private_urls: bool,
    },

    /// Show the reliability ledger
    Sources {
        /// Only show sources with this status (active, probation, blocked)
        #[arg(short, long)]
        status: Option<SourceStatus>,

        /// Print JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Start recovery trials for blocked sources if maintenance is due
    Maintain,

    /// Show extraction cache statistics
    Cache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sift=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = StatePaths::new(cli.state_dir);

    match cli.command {
        Commands::Search {
            query,
            model,
            base_url,
            api_key,
            event_registry_key,
            exa_key,
            diffbot_token,
            max_results,
            discover,
            allow_private_urls,
        } => {
            let mut config = EngineConfig::from_env().context("Invalid SIFT_* configuration")?;
            if let Some(n) = max_results {
                config.max_results = n;
            }

            let providers = build_providers(&config, event_registry_key, exa_key)?;
            let llm = OpenAiChatModel::with_base_url(&api_key, &model, &base_url)
                .context("Failed to create LLM client")?;

            let search = SearchArgs {
                query,
                paths,
                config,
                providers,
                discover,
            };
            match diffbot_token {
                Some(token) => {
                    let extractor = DiffbotExtractor::new(&token)?
                        .with_timeout(search.config.extraction_soft_timeout)?;
                    cmd_search(extractor, llm, search).await?;
                }
                None => {
                    let mut fetcher =
                        ReqwestFetcher::with_timeout(search.config.extraction_soft_timeout)?;
                    if allow_private_urls {
                        fetcher = fetcher.allow_private_urls();
                    }
                    cmd_search(ReadableExtractor::new(fetcher), llm, search).await?;
                }
            }
        }
        Commands::Sources { status, json } => cmd_sources(&paths, status, json)?,
        Commands::Maintain => cmd_maintain(&paths)?,
        Commands::Cache => cmd_cache(&paths)?,
    }

    Ok(())
}

struct SearchArgs {
    query: String,
    paths: StatePaths,
    config: EngineConfig,
    providers: Vec<Arc<dyn SearchProvider>>,
    discover: bool,
}

fn build_providers(
    config: &EngineConfig,
    event_registry_key: Option<String>,
    exa_key: Option<String>,
) -> Result<Vec<Arc<dyn SearchProvider>>> {
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
    if let Some(key) = event_registry_key {
        providers.push(Arc::new(
            EventRegistryProvider::new(&key)?.with_timeout(config.provider_timeout)?,
        ));
    }
    if let Some(key) = exa_key {
        providers.push(Arc::new(ExaProvider::new(&key)?.with_timeout(config.provider_timeout)?));
    }
    if providers.is_empty() {
        bail!("No search provider configured. Set EVENT_REGISTRY_API_KEY and/or EXA_API_KEY.");
    }
    Ok(providers)
}

fn open_tracker(paths: &StatePaths) -> SourceTracker {
    let tracker = SourceTracker::open(paths.sources(), SourceTrackerConfig::default());
    tracker.seed_known_bad(DEFAULT_KNOWN_BAD);
    tracker
}

fn load_outlets(paths: &StatePaths) -> Result<OutletDirectory> {
    let overrides = paths.outlet_overrides();
    let outlets = OutletDirectory::default_seed();
    if overrides.exists() {
        return Ok(outlets.with_overrides(&overrides)?);
    }
    Ok(outlets)
}

async fn cmd_search<X, L>(extractor: X, llm: L, args: SearchArgs) -> Result<()>
where
    X: ContentExtractor + 'static,
    L: LanguageModel + 'static,
{
    let tracker = open_tracker(&args.paths);
    let cache = ExtractionCache::open(args.paths.extraction_cache());
    let outlets = Arc::new(load_outlets(&args.paths)?);

    let mut engine = NewsSearchEngine::new(extractor, llm, tracker.clone(), cache.clone())
        .with_outlets(outlets.clone())
        .with_config(args.config);
    for provider in args.providers {
        engine = engine.with_provider(provider);
    }

    let cancel_token = CancellationToken::new();
    let worker = if args.discover {
        let (queue, worker) =
            discovery_channel(tracker.clone(), outlets.clone(), DiscoveryConfig::default());
        engine = engine.with_discovery(queue);
        Some(tokio::spawn(worker.run(cancel_token.clone())))
    } else {
        None
    };

    tracing::info!(providers = ?engine.provider_names(), "Searching");
    let result = engine.search(&args.query).await;
    // Dropping the engine closes the discovery queue; the worker drains and exits.
    drop(engine);

    if let Some(handle) = worker {
        let stats = handle.await.context("Discovery worker panicked")?;
        if stats.promoted > 0 {
            let added = outlets.save_promoted(&args.paths.outlet_overrides())?;
            tracing::info!(promoted = stats.promoted, added, "Saved discovered outlets");
        }
    }

    if let Err(e) = tracker.save() {
        tracing::warn!(error = %e, "Failed to save source ledger");
    }
    if let Err(e) = cache.save() {
        tracing::warn!(error = %e, "Failed to save extraction cache");
    }

    tracing::info!(
        candidates = result.candidates.len(),
        clusters = result.clusters.len(),
        "Search complete"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn cmd_sources(paths: &StatePaths, status: Option<SourceStatus>, json: bool) -> Result<()> {
    let tracker = open_tracker(paths);
    let reports: Vec<_> = tracker
        .snapshot()
        .into_iter()
        .filter(|r| status.is_none_or(|s| r.status == s))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("No sources recorded in {}", paths.sources().display());
        return Ok(());
    }

    println!(
        "{:<32} {:<10} {:>7} {:>9} {:>6}  BLOCKED SINCE",
        "DOMAIN", "STATUS", "WINDOW", "LIFETIME", "TRIAL"
    );
    for r in &reports {
        let window = r
            .window_success_rate
            .map(|rate| format!("{:.0}%", rate * 100.0))
            .unwrap_or_else(|| "-".to_string());
        let trial = r
            .trial_remaining
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let since = r
            .blocked_since
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:<32} {:<10} {:>7} {:>4}/{:<4} {:>6}  {}",
            r.domain, r.status, window, r.total_successes, r.total_attempts, trial, since
        );
    }
    println!("\nTotal: {} sources", reports.len());

    // Seeding may have added entries on first run.
    tracker.save()?;
    Ok(())
}

fn cmd_maintain(paths: &StatePaths) -> Result<()> {
    let tracker = open_tracker(paths);
    let trials = tracker.run_maintenance();
    tracker.save()?;

    match tracker.last_maintenance() {
        Some(at) => println!(
            "{trials} source(s) placed on recovery trial (last maintenance: {})",
            at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("{trials} source(s) placed on recovery trial"),
    }
    Ok(())
}

fn cmd_cache(paths: &StatePaths) -> Result<()> {
    let cache = ExtractionCache::open(paths.extraction_cache());
    let stats = cache.stats();
    println!("Extraction cache: {}", paths.extraction_cache().display());
    println!("  entries:   {}", stats.entries);
    println!("  successes: {}", stats.successes);
    println!("  failures:  {}", stats.failures);
    // A legacy flat-map file is rewritten in the current format.
    cache.save()?;
    Ok(())
}
