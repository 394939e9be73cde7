use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Raw event data as returned from external APIs/crawlers.
/// Shapes are source-specific and only interpreted by the canonicalizer.
pub type RawEventData = serde_json::Value;

/// Fixed category taxonomy shared by the resolver, router and canonicalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Music,
    Sports,
    Arts,
    Museums,
    Theatre,
    Food,
    Tech,
    Nightlife,
    Family,
    General,
    Other,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Music => "music",
            EventCategory::Sports => "sports",
            EventCategory::Arts => "arts",
            EventCategory::Museums => "museums",
            EventCategory::Theatre => "theatre",
            EventCategory::Food => "food",
            EventCategory::Tech => "tech",
            EventCategory::Nightlife => "nightlife",
            EventCategory::Family => "family",
            EventCategory::General => "general",
            EventCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "music" => Some(EventCategory::Music),
            "sports" => Some(EventCategory::Sports),
            "arts" => Some(EventCategory::Arts),
            "museums" => Some(EventCategory::Museums),
            "theatre" | "theater" => Some(EventCategory::Theatre),
            "food" => Some(EventCategory::Food),
            "tech" => Some(EventCategory::Tech),
            "nightlife" => Some(EventCategory::Nightlife),
            "family" => Some(EventCategory::Family),
            "general" => Some(EventCategory::General),
            "other" => Some(EventCategory::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How quickly a source typically answers. Used for display and diagnostics,
/// not for scheduling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    Fast,
    Medium,
    Slow,
}

impl Default for SpeedTier {
    fn default() -> Self {
        SpeedTier::Medium
    }
}

/// Static description of a pluggable data source, loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub display_name: String,
    /// Country names/codes this source covers, or "global".
    pub supported_regions: HashSet<String>,
    pub supported_categories: Vec<EventCategory>,
    #[serde(default)]
    pub speed_tier: SpeedTier,
    #[serde(default = "default_true")]
    pub enabled_by_default: bool,
    /// Lower value wins ties and dedup conflicts.
    #[serde(default)]
    pub priority: u32,
    /// Optional endpoint template with {city}/{country} placeholders,
    /// consumed by the template-based URL synthesizer.
    #[serde(default)]
    pub endpoint_template: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SourceDescriptor {
    /// Whether this source declares coverage for every region.
    pub fn is_global(&self) -> bool {
        self.supported_regions
            .iter()
            .any(|r| r.eq_ignore_ascii_case(crate::common::constants::GLOBAL_REGION))
    }

    /// Region match against a resolved country (name or ISO code), alias-aware
    /// in the sense that both spellings stored in the registry are accepted.
    pub fn covers_region(&self, country: &str, country_code: &str) -> bool {
        if self.is_global() {
            return true;
        }
        self.supported_regions.iter().any(|r| {
            r.eq_ignore_ascii_case(country) || r.eq_ignore_ascii_case(country_code)
        })
    }

    /// Category match: either the exact category or a general-purpose source.
    pub fn covers_category(&self, category: EventCategory) -> bool {
        self.supported_categories.contains(&category)
            || self.supported_categories.contains(&EventCategory::General)
    }

    /// A specialty source carries exactly one non-general category.
    pub fn is_specialty_for(&self, category: EventCategory) -> bool {
        self.supported_categories.len() == 1
            && self.supported_categories[0] == category
            && category != EventCategory::General
    }
}

/// Structured location produced by the resolver: the geographic hierarchy
/// (country -> country_code -> region -> city) consumed by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub city: String,
    pub region: Option<String>,
    pub country: String,
    pub country_code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub confidence: f64,
}

impl ResolvedLocation {
    /// Full "City, Country" form used in logs and messages.
    pub fn full_location(&self) -> String {
        if self.country.is_empty() || self.country == "unknown" {
            self.city.clone()
        } else {
            format!("{}, {}", self.city, self.country)
        }
    }
}

/// Per-request routing input. Created once per request, read-only afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingContext {
    pub request_id: Uuid,
    pub raw_query: String,
    pub location: ResolvedLocation,
    pub category: EventCategory,
    pub limit: usize,
    pub comprehensive: bool,
    pub budget_hint: Option<u64>,
}

/// The router's output: which sources to run and in what order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub selected_sources: Vec<String>,
    pub fallback_sources: Vec<String>,
    pub confidence_score: f64,
    pub estimated_coverage: f64,
    pub strategies_used: Vec<String>,
}

impl RoutingDecision {
    /// Zero eligible sources. The caller reports this as "no coverage",
    /// never as an error.
    pub fn is_empty(&self) -> bool {
        self.selected_sources.is_empty() && self.fallback_sources.is_empty()
    }
}

/// Why a single source task failed. Absorbed into `ExecutionResult`,
/// never propagated as an error across component boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFailure {
    Timeout { elapsed_ms: u64 },
    Fetch { message: String },
    Panic { message: String },
}

impl std::fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFailure::Timeout { elapsed_ms } => {
                write!(f, "timed out after {elapsed_ms}ms")
            }
            SourceFailure::Fetch { message } => write!(f, "fetch failed: {message}"),
            SourceFailure::Panic { message } => write!(f, "task panicked: {message}"),
        }
    }
}

/// Outcome of one source task, emitted the moment the task finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub source_id: String,
    pub success: bool,
    pub events: Vec<RawEventData>,
    pub error: Option<SourceFailure>,
    pub execution_time_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(
        source_id: String,
        events: Vec<RawEventData>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            source_id,
            success: true,
            events,
            error: None,
            execution_time_ms,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(source_id: String, failure: SourceFailure, execution_time_ms: u64) -> Self {
        Self {
            source_id,
            success: false,
            events: Vec::new(),
            error: Some(failure),
            execution_time_ms,
            completed_at: Utc::now(),
        }
    }
}

/// The normalized, fixed-shape event record used downstream of all sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub venue_name: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub category: EventCategory,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub is_free: bool,
    pub source_id: String,
    pub external_id: String,
    pub image_url: Option<String>,
    pub event_url: Option<String>,
}

impl CanonicalEvent {
    /// Calendar date component of the start time, one leg of the dedup key.
    pub fn start_date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }
}
