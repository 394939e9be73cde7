//! Metrics for the aggregation engine.
//!
//! Provides a straightforward API for recording metrics using the standard
//! Prometheus naming conventions.

use std::fmt;

/// Enum representing all metric names used in the system
/// This eliminates magic strings and provides compile-time safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Sources metrics
    SourcesRequestsSuccess,
    SourcesRequestsError,
    SourcesRequestDuration,

    // Router metrics
    RouterDecisions,
    RouterSelectedSources,
    RouterFallbackSources,
    RouterNoCoverage,

    // Engine metrics
    EngineTasksCompleted,
    EngineTasksFailed,
    EngineTaskDuration,
    EngineTimeouts,
    EngineFallbackWaves,

    // Cache metrics
    CacheHits,
    CacheMisses,
    CacheSynthesisCalls,

    // Canonicalizer metrics
    CanonicalEvents,
    CanonicalDropped,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesRequestsSuccess => "eventscout_sources_requests_success_total",
            MetricName::SourcesRequestsError => "eventscout_sources_requests_error_total",
            MetricName::SourcesRequestDuration => "eventscout_sources_request_duration_seconds",

            MetricName::RouterDecisions => "eventscout_router_decisions_total",
            MetricName::RouterSelectedSources => "eventscout_router_selected_sources",
            MetricName::RouterFallbackSources => "eventscout_router_fallback_sources",
            MetricName::RouterNoCoverage => "eventscout_router_no_coverage_total",

            MetricName::EngineTasksCompleted => "eventscout_engine_tasks_completed_total",
            MetricName::EngineTasksFailed => "eventscout_engine_tasks_failed_total",
            MetricName::EngineTaskDuration => "eventscout_engine_task_duration_seconds",
            MetricName::EngineTimeouts => "eventscout_engine_timeouts_total",
            MetricName::EngineFallbackWaves => "eventscout_engine_fallback_waves_total",

            MetricName::CacheHits => "eventscout_cache_hits_total",
            MetricName::CacheMisses => "eventscout_cache_misses_total",
            MetricName::CacheSynthesisCalls => "eventscout_cache_synthesis_calls_total",

            MetricName::CanonicalEvents => "eventscout_canonical_events_total",
            MetricName::CanonicalDropped => "eventscout_canonical_dropped_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialize the metrics system with a Prometheus exporter.
/// Safe to skip entirely; the recording macros no-op without a recorder.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .install()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    tracing::info!("Metrics system initialized");
    Ok(())
}

// ============================================================================
// Sources Metrics
// ============================================================================

pub mod sources {
    use super::MetricName;

    /// Record a successful request for a source
    pub fn request_success(source_id: &str) {
        ::metrics::counter!(MetricName::SourcesRequestsSuccess.as_str(), "source_id" => source_id.to_string()).increment(1);
    }

    /// Record a failed request for a source
    pub fn request_error(source_id: &str) {
        ::metrics::counter!(MetricName::SourcesRequestsError.as_str(), "source_id" => source_id.to_string()).increment(1);
    }

    /// Record request duration
    pub fn request_duration(source_id: &str, secs: f64) {
        ::metrics::histogram!(MetricName::SourcesRequestDuration.as_str(), "source_id" => source_id.to_string()).record(secs);
    }
}

// ============================================================================
// Router Metrics
// ============================================================================

pub mod router {
    use super::MetricName;

    /// Record a routing decision and its fan-out sizes
    pub fn decision(selected: usize, fallback: usize) {
        ::metrics::counter!(MetricName::RouterDecisions.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RouterSelectedSources.as_str()).record(selected as f64);
        ::metrics::histogram!(MetricName::RouterFallbackSources.as_str()).record(fallback as f64);
    }

    /// Record a request with zero eligible sources
    pub fn no_coverage() {
        ::metrics::counter!(MetricName::RouterNoCoverage.as_str()).increment(1);
    }
}

// ============================================================================
// Engine Metrics
// ============================================================================

pub mod engine {
    use super::MetricName;

    /// Record a finished source task
    pub fn task_completed(source_id: &str, success: bool, elapsed_ms: u64) {
        let name = if success {
            MetricName::EngineTasksCompleted
        } else {
            MetricName::EngineTasksFailed
        };
        ::metrics::counter!(name.as_str(), "source_id" => source_id.to_string()).increment(1);
        ::metrics::histogram!(MetricName::EngineTaskDuration.as_str(), "source_id" => source_id.to_string())
            .record(elapsed_ms as f64 / 1000.0);
    }

    /// Record a timed-out source task
    pub fn timeout(source_id: &str) {
        ::metrics::counter!(MetricName::EngineTimeouts.as_str(), "source_id" => source_id.to_string()).increment(1);
    }

    /// Record a triggered fallback wave
    pub fn fallback_wave(sources: usize) {
        ::metrics::counter!(MetricName::EngineFallbackWaves.as_str()).increment(1);
        ::metrics::histogram!(MetricName::RouterFallbackSources.as_str()).record(sources as f64);
    }
}

// ============================================================================
// Cache Metrics
// ============================================================================

pub mod cache {
    use super::MetricName;

    /// Record a pattern cache hit
    pub fn hit(source_id: &str) {
        ::metrics::counter!(MetricName::CacheHits.as_str(), "source_id" => source_id.to_string()).increment(1);
    }

    /// Record a pattern cache miss
    pub fn miss(source_id: &str) {
        ::metrics::counter!(MetricName::CacheMisses.as_str(), "source_id" => source_id.to_string()).increment(1);
    }

    /// Record a delegated synthesis call
    pub fn synthesis(source_id: &str) {
        ::metrics::counter!(MetricName::CacheSynthesisCalls.as_str(), "source_id" => source_id.to_string()).increment(1);
    }
}

// ============================================================================
// Canonicalizer Metrics
// ============================================================================

pub mod canonical {
    use super::MetricName;

    /// Record canonicalized events for a source batch
    pub fn events(source_id: &str, count: usize) {
        ::metrics::counter!(MetricName::CanonicalEvents.as_str(), "source_id" => source_id.to_string())
            .increment(count as u64);
    }

    /// Record dropped malformed records for a source batch
    pub fn dropped(source_id: &str, count: usize) {
        if count > 0 {
            ::metrics::counter!(MetricName::CanonicalDropped.as_str(), "source_id" => source_id.to_string())
                .increment(count as u64);
        }
    }
}
