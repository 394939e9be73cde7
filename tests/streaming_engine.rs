//! Engine-level streaming behavior: completion order, failure isolation,
//! bounded admission, fallback waves and the one-result-per-task invariant.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use eventscout::apis::{EventSource, SourceCatalog};
use eventscout::common::error::{EngineError, Result};
use eventscout::domain::{
    EventCategory, RawEventData, ResolvedLocation, RoutingContext, RoutingDecision, SourceFailure,
};
use eventscout::engine::{stats::SourceStatsTable, ExecutionConfig, ExecutionEngine};

struct FixedSource {
    id: String,
    events: usize,
    delay: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FixedSource {
    fn new(id: &str, events: usize, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events,
            delay: Duration::from_millis(delay_ms),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl EventSource for FixedSource {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, _location: &ResolvedLocation, _limit: usize) -> Result<Vec<RawEventData>> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok((0..self.events)
            .map(|i| json!({"title": format!("{} event {}", self.id, i), "date": "2026-09-12", "venue": "Test Hall"}))
            .collect())
    }
}

struct FailingSource(String);

#[async_trait]
impl EventSource for FailingSource {
    fn source_id(&self) -> &str {
        &self.0
    }

    async fn fetch(&self, _location: &ResolvedLocation, _limit: usize) -> Result<Vec<RawEventData>> {
        Err(EngineError::Source {
            source_id: self.0.clone(),
            message: "connection refused".to_string(),
        })
    }
}

struct HangingSource(String);

#[async_trait]
impl EventSource for HangingSource {
    fn source_id(&self) -> &str {
        &self.0
    }

    async fn fetch(&self, _location: &ResolvedLocation, _limit: usize) -> Result<Vec<RawEventData>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

struct PanickingSource(String);

#[async_trait]
impl EventSource for PanickingSource {
    fn source_id(&self) -> &str {
        &self.0
    }

    async fn fetch(&self, _location: &ResolvedLocation, _limit: usize) -> Result<Vec<RawEventData>> {
        panic!("unexpected source bug")
    }
}

fn barcelona_ctx(limit: usize) -> RoutingContext {
    RoutingContext {
        request_id: Uuid::new_v4(),
        raw_query: "events in barcelona".to_string(),
        location: ResolvedLocation {
            city: "Barcelona".to_string(),
            region: Some("Cataluña".to_string()),
            country: "España".to_string(),
            country_code: "ES".to_string(),
            latitude: None,
            longitude: None,
            confidence: 0.9,
        },
        category: EventCategory::Music,
        limit,
        comprehensive: false,
        budget_hint: None,
    }
}

fn decision(selected: &[&str], fallback: &[&str]) -> RoutingDecision {
    RoutingDecision {
        selected_sources: selected.iter().map(|s| s.to_string()).collect(),
        fallback_sources: fallback.iter().map(|s| s.to_string()).collect(),
        confidence_score: 0.9,
        estimated_coverage: 0.8,
        strategies_used: vec!["primary".to_string()],
    }
}

fn engine_with(sources: Vec<Arc<dyn EventSource>>, config: ExecutionConfig) -> ExecutionEngine {
    let mut catalog = SourceCatalog::new();
    for source in sources {
        catalog.register(source);
    }
    ExecutionEngine::new(Arc::new(catalog), Arc::new(SourceStatsTable::new()), config)
}

fn quick_config() -> ExecutionConfig {
    ExecutionConfig {
        max_concurrency: 4,
        source_timeout: Duration::from_millis(300),
        coverage_threshold: 0.5,
    }
}

#[tokio::test]
async fn one_result_per_selected_source_never_more() {
    let engine = engine_with(
        vec![
            FixedSource::new("a", 2, 5),
            FixedSource::new("b", 3, 5),
            FixedSource::new("c", 0, 5),
        ],
        quick_config(),
    );
    let mut rx = engine.execute_streaming(&barcelona_ctx(10), &decision(&["a", "b", "c"], &[]));

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    assert_eq!(results.len(), 3);
    let mut ids: Vec<String> = results.iter().map(|r| r.source_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn failure_isolation_converts_faults_to_results() {
    // one source raises, one hangs past its timeout, one returns 5 events
    let engine = engine_with(
        vec![
            Arc::new(FailingSource("broken".to_string())),
            Arc::new(HangingSource("sleepy".to_string())),
            FixedSource::new("healthy", 5, 5),
        ],
        quick_config(),
    );
    let mut rx = engine.execute_streaming(
        &barcelona_ctx(5),
        &decision(&["broken", "sleepy", "healthy"], &[]),
    );

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    assert_eq!(results.len(), 3);

    let total_events: usize = results.iter().map(|r| r.events.len()).sum();
    assert_eq!(total_events, 5);

    let failures: Vec<&SourceFailure> = results.iter().filter_map(|r| r.error.as_ref()).collect();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().any(|f| matches!(f, SourceFailure::Fetch { .. })));
    assert!(failures.iter().any(|f| matches!(f, SourceFailure::Timeout { .. })));
}

#[tokio::test]
async fn panics_are_caught_at_the_task_boundary() {
    let engine = engine_with(
        vec![
            Arc::new(PanickingSource("buggy".to_string())),
            FixedSource::new("healthy", 1, 5),
        ],
        quick_config(),
    );
    let mut rx = engine.execute_streaming(&barcelona_ctx(5), &decision(&["buggy", "healthy"], &[]));

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    assert_eq!(results.len(), 2);
    let buggy = results.iter().find(|r| r.source_id == "buggy").unwrap();
    assert!(matches!(buggy.error, Some(SourceFailure::Panic { .. })));
    let healthy = results.iter().find(|r| r.source_id == "healthy").unwrap();
    assert!(healthy.success);
}

#[tokio::test]
async fn results_arrive_in_completion_order_not_submission_order() {
    let engine = engine_with(
        vec![FixedSource::new("slow", 1, 200), FixedSource::new("fast", 1, 5)],
        quick_config(),
    );
    // slow is submitted first; fast must still stream back first
    let mut rx = engine.execute_streaming(&barcelona_ctx(5), &decision(&["slow", "fast"], &[]));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.source_id, "fast");
    let second = rx.recv().await.unwrap();
    assert_eq!(second.source_id, "slow");
}

#[tokio::test]
async fn admission_limiter_bounds_concurrency() {
    // all three sources report into one shared running/peak gauge
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let gauged = |id: &str| -> Arc<dyn EventSource> {
        Arc::new(FixedSource {
            id: id.to_string(),
            events: 1,
            delay: Duration::from_millis(50),
            running: Arc::clone(&running),
            peak: Arc::clone(&peak),
        })
    };

    let config = ExecutionConfig {
        max_concurrency: 1,
        source_timeout: Duration::from_secs(2),
        coverage_threshold: 0.5,
    };
    let engine = engine_with(vec![gauged("a"), gauged("b"), gauged("c")], config);
    let mut rx = engine.execute_streaming(&barcelona_ctx(5), &decision(&["a", "b", "c"], &[]));
    while rx.recv().await.is_some() {}

    assert_eq!(peak.load(Ordering::SeqCst), 1, "limiter admitted more than one task");
}

#[tokio::test]
async fn fallback_wave_launches_when_coverage_is_low() {
    let engine = engine_with(
        vec![FixedSource::new("primary", 0, 5), FixedSource::new("backup", 4, 5)],
        quick_config(),
    );
    // primary returns nothing against a limit of 10: coverage 0 < 0.5
    let mut rx = engine.execute_streaming(&barcelona_ctx(10), &decision(&["primary"], &["backup"]));

    let mut ids = Vec::new();
    while let Some(result) = rx.recv().await {
        ids.push(result.source_id);
    }
    assert_eq!(ids, vec!["primary", "backup"]);
}

#[tokio::test]
async fn fallback_wave_skipped_when_coverage_is_met() {
    let engine = engine_with(
        vec![FixedSource::new("primary", 9, 5), FixedSource::new("backup", 4, 5)],
        quick_config(),
    );
    // 9 events against a limit of 10 clears the 0.5 threshold
    let mut rx = engine.execute_streaming(&barcelona_ctx(10), &decision(&["primary"], &["backup"]));

    let mut ids = Vec::new();
    while let Some(result) = rx.recv().await {
        ids.push(result.source_id);
    }
    assert_eq!(ids, vec!["primary"]);
}

#[tokio::test]
async fn dropped_consumer_still_updates_shared_stats() {
    let catalog = {
        let mut c = SourceCatalog::new();
        c.register(FixedSource::new("a", 2, 50));
        c.register(FixedSource::new("b", 2, 50));
        Arc::new(c)
    };
    let stats = Arc::new(SourceStatsTable::new());
    let engine = ExecutionEngine::new(Arc::clone(&catalog), Arc::clone(&stats), quick_config());

    let rx = engine.execute_streaming(&barcelona_ctx(5), &decision(&["a", "b"], &[]));
    drop(rx); // consumer disconnects immediately

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(stats.get("a").await.unwrap().total_runs, 1);
    assert_eq!(stats.get("b").await.unwrap().total_runs, 1);
}
