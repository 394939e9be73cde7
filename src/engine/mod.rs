//! Concurrent fan-out/fan-in over the selected sources.
//!
//! One tokio task per source, admitted through a fixed-size semaphore so the
//! fan-out width never exceeds the limiter regardless of how many sources a
//! decision names. Results stream back in completion order; a misbehaving
//! source is converted into a failed `ExecutionResult` at the task boundary
//! and never aborts its siblings.

pub mod stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::apis::{EventSource, SourceCatalog};
use crate::domain::{ExecutionResult, RoutingContext, RoutingDecision, SourceFailure};
use crate::observability::metrics;
use stats::SourceStatsTable;

/// Delivery channel depth; results beyond this apply backpressure to the
/// forwarding loop, not to the source tasks themselves.
const RESULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Fixed admission limit, independent of fan-out size.
    pub max_concurrency: usize,
    /// Individual timeout per source task.
    pub source_timeout: Duration,
    /// Realized-coverage fraction below which the fallback wave launches.
    pub coverage_threshold: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            source_timeout: Duration::from_secs(12),
            coverage_threshold: 0.5,
        }
    }
}

/// One unit of work handed to a source task. Tasks are never retried within
/// the same request.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub source_id: String,
    pub location: String,
    pub limit: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ExecutionEngine {
    catalog: Arc<SourceCatalog>,
    stats: Arc<SourceStatsTable>,
    limiter: Arc<Semaphore>,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(catalog: Arc<SourceCatalog>, stats: Arc<SourceStatsTable>, config: ExecutionConfig) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            catalog,
            stats,
            limiter,
            config,
        }
    }

    pub fn stats(&self) -> Arc<SourceStatsTable> {
        Arc::clone(&self.stats)
    }

    /// Fan out the decision's sources and stream results back in completion
    /// order. The returned channel is finite: exactly one `ExecutionResult`
    /// per selected source, plus one per fallback source if the fallback
    /// wave triggers. Calling again re-executes everything.
    ///
    /// Dropping the receiver stops delivery; in-flight tasks still run to
    /// completion and update the shared stats table.
    #[instrument(skip(self, ctx, decision), fields(request_id = %ctx.request_id))]
    pub fn execute_streaming(
        &self,
        ctx: &RoutingContext,
        decision: &RoutingDecision,
    ) -> mpsc::Receiver<ExecutionResult> {
        let (out_tx, out_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

        let ctx = Arc::new(ctx.clone());
        let selected = decision.selected_sources.clone();
        let fallback = decision.fallback_sources.clone();
        let catalog = Arc::clone(&self.catalog);
        let stats = Arc::clone(&self.stats);
        let limiter = Arc::clone(&self.limiter);
        let config = self.config.clone();

        tokio::spawn(async move {
            // Sized so completed tasks can always hand off their result even
            // if this driver has already stopped forwarding.
            let slots = (selected.len() + fallback.len()).max(1);
            let (done_tx, mut done_rx) = mpsc::channel::<ExecutionResult>(slots);

            let launched = launch_wave(&selected, &ctx, &catalog, &stats, &limiter, config.source_timeout, &done_tx);
            info!(sources = launched, "primary wave launched");

            let mut connected = true;
            let mut total_events = 0usize;
            for _ in 0..launched {
                let Some(result) = done_rx.recv().await else { break };
                total_events += result.events.len();
                if connected && out_tx.send(result).await.is_err() {
                    debug!("consumer disconnected; delivery halted");
                    connected = false;
                }
            }

            let target = ctx.limit.max(1) as f64;
            let realized = total_events as f64 / target;
            if realized < config.coverage_threshold && !fallback.is_empty() && connected {
                info!(
                    realized_coverage = realized,
                    threshold = config.coverage_threshold,
                    sources = fallback.len(),
                    "coverage below threshold; launching fallback wave"
                );
                metrics::engine::fallback_wave(fallback.len());
                let launched = launch_wave(&fallback, &ctx, &catalog, &stats, &limiter, config.source_timeout, &done_tx);
                for _ in 0..launched {
                    let Some(result) = done_rx.recv().await else { break };
                    if connected && out_tx.send(result).await.is_err() {
                        connected = false;
                    }
                }
            }
        });

        out_rx
    }
}

/// Spawn one task per source id. Returns the number launched; each launched
/// task sends exactly one `ExecutionResult` to `done_tx`.
fn launch_wave(
    source_ids: &[String],
    ctx: &Arc<RoutingContext>,
    catalog: &Arc<SourceCatalog>,
    stats: &Arc<SourceStatsTable>,
    limiter: &Arc<Semaphore>,
    timeout: Duration,
    done_tx: &mpsc::Sender<ExecutionResult>,
) -> usize {
    for source_id in source_ids {
        let source = catalog.get(source_id);
        let source_id = source_id.clone();
        let ctx = Arc::clone(ctx);
        let stats = Arc::clone(stats);
        let limiter = Arc::clone(limiter);
        let done_tx = done_tx.clone();

        tokio::spawn(async move {
            // FIFO admission; queued tasks hold no resources while waiting.
            let Ok(_permit) = limiter.acquire_owned().await else {
                return;
            };
            let result = run_source_task(source_id, source, &ctx, timeout).await;

            stats
                .record(&result.source_id, result.success, result.execution_time_ms, result.events.len())
                .await;
            metrics::engine::task_completed(&result.source_id, result.success, result.execution_time_ms);

            // A closed channel means the whole request was torn down; the
            // stats update above is the part that must not be lost.
            let _ = done_tx.send(result).await;
        });
    }
    source_ids.len()
}

/// Run a single source to completion, converting every failure mode
/// (error, timeout, panic) into a failed `ExecutionResult`.
async fn run_source_task(
    source_id: String,
    source: Option<Arc<dyn EventSource>>,
    ctx: &RoutingContext,
    timeout: Duration,
) -> ExecutionResult {
    let Some(source) = source else {
        warn!(source_id = %source_id, "source missing from catalog");
        return ExecutionResult::failed(
            source_id,
            SourceFailure::Fetch {
                message: "source not registered in catalog".to_string(),
            },
            0,
        );
    };

    let task = ExecutionTask {
        source_id: source_id.clone(),
        location: ctx.location.full_location(),
        limit: ctx.limit,
        started_at: Utc::now(),
    };
    debug!(source_id = %task.source_id, location = %task.location, "task started");

    let location = ctx.location.clone();
    let limit = ctx.limit;
    let started = Instant::now();

    // The inner spawn isolates panics: a panicking source surfaces as a
    // JoinError here instead of unwinding through the stream driver.
    let mut fetch = tokio::spawn(async move { source.fetch(&location, limit).await });

    match tokio::time::timeout(timeout, &mut fetch).await {
        Ok(Ok(Ok(events))) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            debug!(source_id = %source_id, events = events.len(), elapsed_ms, "task completed");
            ExecutionResult::succeeded(source_id, events, elapsed_ms)
        }
        Ok(Ok(Err(e))) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            warn!(source_id = %source_id, error = %e, "source failed");
            ExecutionResult::failed(
                source_id,
                SourceFailure::Fetch { message: e.to_string() },
                elapsed_ms,
            )
        }
        Ok(Err(join_err)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            warn!(source_id = %source_id, error = %join_err, "source task panicked");
            ExecutionResult::failed(
                source_id,
                SourceFailure::Panic { message: join_err.to_string() },
                elapsed_ms,
            )
        }
        Err(_) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            fetch.abort();
            warn!(source_id = %source_id, elapsed_ms, "source timed out");
            metrics::engine::timeout(&source_id);
            ExecutionResult::failed(source_id, SourceFailure::Timeout { elapsed_ms }, elapsed_ms)
        }
    }
}
