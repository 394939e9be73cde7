//! Request and stream message shapes for the search surface.
//!
//! One message per `ExecutionResult` plus a final summary. Partial failure
//! is a normal success envelope with per-source error detail; only zero
//! eligible sources is reported as `no_coverage`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CanonicalEvent, EventCategory, SourceFailure};

/// Incoming search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub location_hint: Option<LocationHint>,
    #[serde(default)]
    pub category: Option<EventCategory>,
    #[serde(default)]
    pub comprehensive: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Explicit expand-to-nearby-locations mode.
    #[serde(default)]
    pub expand_nearby: bool,
}

impl SearchRequest {
    pub fn for_query(query: &str) -> Self {
        Self {
            query: query.to_string(),
            location_hint: None,
            category: None,
            comprehensive: false,
            limit: None,
            expand_nearby: false,
        }
    }
}

/// Optional location hint accompanying the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationHint {
    Coordinates { lat: f64, lon: f64 },
    City { city: String },
}

/// One stream message per execution result, plus lifecycle markers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchMessage {
    Started {
        request_id: Uuid,
        query: String,
        location: String,
        category: EventCategory,
        confidence: f64,
        estimated_coverage: f64,
        sources: Vec<String>,
        expanded_cities: Vec<String>,
    },
    SourceCompleted {
        source_id: String,
        events: Vec<CanonicalEvent>,
        execution_time_ms: u64,
        dropped: usize,
    },
    SourceEmpty {
        source_id: String,
        execution_time_ms: u64,
    },
    SourceError {
        source_id: String,
        error: SourceFailure,
        execution_time_ms: u64,
    },
    NoCoverage {
        location: String,
    },
    Completed {
        /// Deduplicated canonical result set across every source and wave.
        events: Vec<CanonicalEvent>,
        summary: SearchSummary,
    },
}

/// Per-source timing entry for the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceTiming {
    pub source_id: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub events: usize,
}

/// Per-source error detail for the final summary.
#[derive(Debug, Clone, Serialize)]
pub struct SourceErrorDetail {
    pub source_id: String,
    pub error: SourceFailure,
}

/// Final request summary. Diagnostic counts (failed sources, dropped
/// records) are always carried here, even though they never block the
/// response.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSummary {
    pub request_id: Uuid,
    /// True for full and partial success alike.
    pub success: bool,
    pub total_events: usize,
    pub unique_events: usize,
    pub sources_completed: usize,
    pub sources_failed: usize,
    pub dropped_records: usize,
    pub duration_ms: u64,
    pub timings: Vec<SourceTiming>,
    pub errors: Vec<SourceErrorDetail>,
}
