use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use eventscout::apis::factory;
use eventscout::app::messages::{LocationHint, SearchMessage, SearchRequest};
use eventscout::app::search::SearchService;
use eventscout::cache::UrlPatternCache;
use eventscout::config::AppConfig;
use eventscout::domain::EventCategory;
use eventscout::engine::{stats::SourceStatsTable, ExecutionEngine};
use eventscout::infra::TemplateUrlSynthesizer;
use eventscout::observability::{logging, metrics};
use eventscout::registry::SourceRegistry;
use eventscout::resolver::IntentResolver;

#[derive(Parser)]
#[command(name = "eventscout")]
#[command(about = "Streaming multi-source event listings aggregation engine")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for events matching a free-text query
    Search {
        /// Free-text query, e.g. "música en Barcelona este finde"
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Widen the fan-out for comprehensive coverage
        #[arg(long)]
        comprehensive: bool,
        /// Expand the search to nearby cities
        #[arg(long)]
        nearby: bool,
        /// Category override (music, sports, arts, ...)
        #[arg(long)]
        category: Option<String>,
        /// City hint when the query itself carries no location
        #[arg(long)]
        city: Option<String>,
    },
    /// List the sources in the registry
    Sources,
    /// URL pattern cache maintenance
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache counters
    Stats,
    /// Re-verify flagged and stale cache entries
    Sweep,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    if config.metrics.enabled {
        if let Err(e) = metrics::init() {
            warn!("metrics init failed: {}", e);
        }
    }

    let registry = SourceRegistry::load(&config.registry.dir);
    let synthesizer = Arc::new(TemplateUrlSynthesizer::new(registry.clone()));
    let cache = Arc::new(UrlPatternCache::load(&config.cache.path, synthesizer)?);

    match cli.command {
        Commands::Search {
            query,
            limit,
            comprehensive,
            nearby,
            category,
            city,
        } => {
            let catalog = Arc::new(factory::build_catalog(&registry, &cache));
            let engine = ExecutionEngine::new(
                catalog,
                Arc::new(SourceStatsTable::new()),
                config.execution_config(),
            );
            let service = SearchService::new(
                IntentResolver::new(None),
                registry,
                engine,
                config.router_config(),
                config.search_config(),
            );

            let category = category.and_then(|c| {
                let parsed = EventCategory::parse(&c);
                if parsed.is_none() {
                    warn!("unknown category, detecting from query instead");
                }
                parsed
            });
            let request = SearchRequest {
                query,
                location_hint: city.map(|city| LocationHint::City { city }),
                category,
                comprehensive,
                limit,
                expand_nearby: nearby,
            };

            run_search(&service, request).await?;
            cache.close().await?;
        }
        Commands::Sources => {
            println!("📋 Registered sources:");
            for descriptor in registry.descriptors() {
                let regions: Vec<&str> = descriptor
                    .supported_regions
                    .iter()
                    .map(|s| s.as_str())
                    .collect();
                println!(
                    "   {} ({}) priority={} regions={} enabled={}",
                    descriptor.id,
                    descriptor.display_name,
                    descriptor.priority,
                    regions.join(","),
                    descriptor.enabled_by_default,
                );
            }
        }
        Commands::Cache { command } => match command {
            CacheCommands::Stats => {
                let meta = cache.metadata().await;
                println!("📦 URL pattern cache:");
                println!("   Patterns: {}", meta.total_patterns);
                println!("   Hits: {}", meta.cache_hits);
                println!("   Synthesis calls saved: {}", meta.ai_calls_saved);
            }
            CacheCommands::Sweep => {
                println!("🧹 Sweeping URL pattern cache...");
                let client = reqwest::Client::new();
                let report = cache.sweep(&client).await?;
                println!(
                    "✅ Sweep finished: {} checked, {} restored, {} still failing",
                    report.checked, report.restored, report.still_failing
                );
                cache.close().await?;
            }
        },
    }

    Ok(())
}

async fn run_search(service: &SearchService, request: SearchRequest) -> anyhow::Result<()> {
    let mut rx = service.search(request).await?;

    while let Some(message) = rx.recv().await {
        match message {
            SearchMessage::Started {
                location,
                category,
                sources,
                confidence,
                ..
            } => {
                info!(location = %location, sources = sources.len(), "search started");
                println!(
                    "🔎 Searching {} for {} events (confidence {:.2})",
                    location, category, confidence
                );
                println!("   Sources: {}", sources.join(", "));
            }
            SearchMessage::SourceCompleted {
                source_id,
                events,
                execution_time_ms,
                ..
            } => {
                println!(
                    "   ✅ {} returned {} events in {}ms",
                    source_id,
                    events.len(),
                    execution_time_ms
                );
            }
            SearchMessage::SourceEmpty {
                source_id,
                execution_time_ms,
            } => {
                println!("   ⬜ {} returned nothing ({}ms)", source_id, execution_time_ms);
            }
            SearchMessage::SourceError {
                source_id,
                error,
                execution_time_ms,
            } => {
                println!("   ⚠️  {} failed after {}ms: {}", source_id, execution_time_ms, error);
            }
            SearchMessage::NoCoverage { location } => {
                println!("🚫 No source coverage for {}", location);
            }
            SearchMessage::Completed { events, summary } => {
                println!("\n📊 Search results:");
                println!("   Total events: {}", summary.total_events);
                println!("   Unique events: {}", summary.unique_events);
                println!(
                    "   Sources: {} completed, {} failed",
                    summary.sources_completed, summary.sources_failed
                );
                if summary.dropped_records > 0 {
                    println!("   Dropped malformed records: {}", summary.dropped_records);
                }
                println!("   Duration: {}ms", summary.duration_ms);

                if !summary.errors.is_empty() {
                    println!("\n⚠️  Source errors:");
                    for detail in &summary.errors {
                        println!("   - {}: {}", detail.source_id, detail.error);
                    }
                }

                for event in events.iter().take(20) {
                    let price = if event.is_free {
                        "free".to_string()
                    } else {
                        match event.price {
                            Some(p) => format!("{:.2} {}", p, event.currency.as_deref().unwrap_or("")),
                            None => "?".to_string(),
                        }
                    };
                    println!(
                        "   {} | {} @ {} [{}] ({})",
                        event.start_time.format("%Y-%m-%d %H:%M"),
                        event.title,
                        event.venue_name,
                        event.category,
                        price.trim()
                    );
                }
            }
        }
    }

    Ok(())
}
