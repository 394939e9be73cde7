//! Location/intent resolution: free text in, `RoutingContext` out.
//!
//! Resolution never raises. The alias table and gazetteer answer most
//! queries in O(1)/O(n) without leaving the process; everything else is
//! delegated to the external location-inference collaborator. Total failure
//! degrades to a low-confidence context carrying the raw query.

pub mod gazetteer;

use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::app::ports::LocationInferrer;
use crate::domain::{EventCategory, ResolvedLocation, RoutingContext};
use gazetteer::CityRecord;

/// Confidence assigned to a direct alias hit.
pub const ALIAS_CONFIDENCE: f64 = 0.95;
/// Confidence assigned to a gazetteer scan hit.
pub const GAZETTEER_CONFIDENCE: f64 = 0.9;
/// Ceiling for a resolution that fell all the way through.
pub const FALLBACK_CONFIDENCE: f64 = 0.2;

/// Priority-ordered keyword taxonomy for category detection.
/// First matching set wins; order is load-bearing (specific before broad).
const CATEGORY_KEYWORDS: &[(EventCategory, &[&str])] = &[
    (EventCategory::Museums, &["museum", "museo", "exhibition", "exposición", "gallery", "galería"]),
    (EventCategory::Theatre, &["theatre", "theater", "teatro", "musical", "ópera", "opera"]),
    (EventCategory::Sports, &["sports", "deporte", "match", "partido", "fútbol", "futbol", "football", "basketball", "tennis", "marathon", "maratón"]),
    (EventCategory::Tech, &["tech", "hackathon", "conference", "conferencia", "startup", "developer"]),
    (EventCategory::Food, &["food", "gastronomía", "gastronomia", "tapas", "restaurant", "wine", "vino", "feria gastronómica"]),
    (EventCategory::Nightlife, &["nightlife", "club", "fiesta", "party", "rave", "dj"]),
    (EventCategory::Family, &["family", "familia", "kids", "niños", "ninos", "infantil"]),
    (EventCategory::Music, &["música", "musica", "music", "concert", "concierto", "gig", "festival", "banda", "band"]),
    (EventCategory::Arts, &["art", "arte", "cultura", "cultural", "dance", "danza"]),
];

/// Extra options for building the context; defaults match the plain
/// `resolve(query)` entry point.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub limit: usize,
    pub comprehensive: bool,
    pub category_override: Option<EventCategory>,
    pub city_hint: Option<String>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            comprehensive: false,
            category_override: None,
            city_hint: None,
        }
    }
}

pub struct IntentResolver {
    inferrer: Option<Arc<dyn LocationInferrer>>,
}

impl IntentResolver {
    pub fn new(inferrer: Option<Arc<dyn LocationInferrer>>) -> Self {
        Self { inferrer }
    }

    /// Resolve a free-text query into a routing context. Never fails;
    /// an unresolvable location is surfaced as confidence <= 0.2, not hidden.
    pub async fn resolve(&self, query: &str) -> RoutingContext {
        self.resolve_with(query, ResolveOptions::default()).await
    }

    #[instrument(skip(self), fields(query = %query))]
    pub async fn resolve_with(&self, query: &str, opts: ResolveOptions) -> RoutingContext {
        let category = opts
            .category_override
            .unwrap_or_else(|| detect_category(query));

        let location_text = opts.city_hint.as_deref().unwrap_or(query);
        let location = self.resolve_location(location_text).await;

        debug!(
            city = %location.city,
            country = %location.country,
            confidence = location.confidence,
            category = %category,
            "resolved query"
        );

        RoutingContext {
            request_id: Uuid::new_v4(),
            raw_query: query.to_string(),
            location,
            category,
            limit: opts.limit,
            comprehensive: opts.comprehensive,
            budget_hint: None,
        }
    }

    async fn resolve_location(&self, text: &str) -> ResolvedLocation {
        let lower = text.to_lowercase();

        // Alias table first: O(1), deterministic, high confidence.
        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            if let Some(city_name) = gazetteer::ALIASES.get(token) {
                if let Some(record) = gazetteer::find_city(city_name) {
                    return location_from_record(record, ALIAS_CONFIDENCE);
                }
            }
        }

        // Gazetteer scan for a known city name inside the query.
        if let Some(record) = gazetteer::scan_query(&lower) {
            return location_from_record(record, GAZETTEER_CONFIDENCE);
        }

        // Delegate to the external inference collaborator; never guess silently.
        if let Some(inferrer) = &self.inferrer {
            match inferrer.infer(text).await {
                Ok(Some(inferred)) => {
                    // The collaborator may name a city we know; trust our own
                    // hierarchy for it in that case.
                    if let Some(record) = gazetteer::find_city(&inferred.city) {
                        let confidence = inferred.confidence.clamp(0.0, 1.0);
                        return location_from_record(record, confidence);
                    }
                    return ResolvedLocation {
                        city: inferred.city,
                        region: inferred.province,
                        country: inferred.country,
                        country_code: inferred.country_code.unwrap_or_default(),
                        latitude: None,
                        longitude: None,
                        confidence: inferred.confidence.clamp(0.0, 1.0),
                    };
                }
                Ok(None) => {
                    debug!("location inferrer returned no result");
                }
                Err(e) => {
                    warn!("location inference failed: {}", e);
                }
            }
        }

        // Total failure: keep the raw text as the location, low confidence.
        ResolvedLocation {
            city: text.trim().to_string(),
            region: None,
            country: "unknown".to_string(),
            country_code: String::new(),
            latitude: None,
            longitude: None,
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    /// Nearest known cities by the static distance table, used only by the
    /// explicit expand-to-nearby mode.
    pub fn nearest_cities(&self, city: &str, n: usize) -> Vec<&'static CityRecord> {
        let Some(origin) = gazetteer::find_city(city) else {
            return Vec::new();
        };
        let mut others: Vec<(&CityRecord, f64)> = gazetteer::CITIES
            .iter()
            .filter(|c| !c.city.eq_ignore_ascii_case(origin.city))
            .map(|c| (c, gazetteer::distance_km(origin, c)))
            .collect();
        others.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        others.into_iter().take(n).map(|(c, _)| c).collect()
    }
}

fn location_from_record(record: &CityRecord, confidence: f64) -> ResolvedLocation {
    ResolvedLocation {
        city: record.city.to_string(),
        region: Some(record.region.to_string()),
        country: record.country.to_string(),
        country_code: record.country_code.to_string(),
        latitude: Some(record.latitude),
        longitude: Some(record.longitude),
        confidence,
    }
}

/// First matching keyword set wins; `General` when nothing matches.
pub fn detect_category(query: &str) -> EventCategory {
    let lower = query.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *category;
        }
    }
    EventCategory::General
}
