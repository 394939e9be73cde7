//! Source routing: which sources run for a resolved context, in what order.

use tracing::{debug, instrument};

use crate::domain::{EventCategory, RoutingContext, RoutingDecision, SourceDescriptor};
use crate::engine::stats::SourceStatsTable;
use crate::observability::metrics;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Hard cap on `selected_sources`; overflow becomes fallback.
    pub max_fanout: usize,
    /// Cap used when the request asks for comprehensive coverage.
    pub comprehensive_fanout: usize,
    /// Expected events for a source with no rolling history yet.
    pub default_expected_events: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_fanout: 5,
            comprehensive_fanout: 8,
            default_expected_events: 8.0,
        }
    }
}

struct ScoredSource<'a> {
    descriptor: &'a SourceDescriptor,
    score: f64,
    country_specific: bool,
}

/// Produce a routing decision for the resolved context. Zero eligible
/// sources yields an empty decision with confidence 0; the caller reports
/// that as "no coverage", never as an error.
#[instrument(skip_all, fields(request_id = %ctx.request_id, city = %ctx.location.city))]
pub async fn route(
    ctx: &RoutingContext,
    available: &[SourceDescriptor],
    stats: &SourceStatsTable,
    config: &RouterConfig,
) -> RoutingDecision {
    let mut strategies = vec!["region_filter".to_string()];

    // 1. Region filter: country-specific match or declared global coverage.
    let eligible: Vec<&SourceDescriptor> = available
        .iter()
        .filter(|d| d.covers_region(&ctx.location.country, &ctx.location.country_code))
        .collect();

    if eligible.is_empty() {
        debug!("no eligible sources for location");
        metrics::router::no_coverage();
        return RoutingDecision {
            selected_sources: Vec::new(),
            fallback_sources: Vec::new(),
            confidence_score: 0.0,
            estimated_coverage: 0.0,
            strategies_used: strategies,
        };
    }
    if eligible.iter().all(|d| d.is_global()) {
        strategies.push("global_only".to_string());
    }

    // 2. Partition: primary (default-enabled, category-compatible) and
    //    specialty (dedicated to exactly this category).
    let mut candidates: Vec<ScoredSource> = Vec::new();
    for descriptor in eligible {
        let primary = descriptor.enabled_by_default && descriptor.covers_category(ctx.category);
        let specialty = descriptor.is_specialty_for(ctx.category);
        if !primary && !specialty {
            continue;
        }
        if specialty && !strategies.iter().any(|s| s == "specialty") {
            strategies.push("specialty".to_string());
        }
        let country_specific = !descriptor.is_global();
        candidates.push(ScoredSource {
            score: score(descriptor, ctx.category, country_specific),
            descriptor,
            country_specific,
        });
    }

    if candidates.is_empty() {
        metrics::router::no_coverage();
        return RoutingDecision {
            selected_sources: Vec::new(),
            fallback_sources: Vec::new(),
            confidence_score: 0.0,
            estimated_coverage: 0.0,
            strategies_used: strategies,
        };
    }
    strategies.insert(1, "primary".to_string());

    // 3. Score ordering, ties broken by declared priority ascending.
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.descriptor.priority.cmp(&b.descriptor.priority))
            .then_with(|| a.descriptor.id.cmp(&b.descriptor.id))
    });

    // 4. Fan-out cap; overflow becomes the fallback list.
    let fanout = if ctx.comprehensive {
        config.comprehensive_fanout
    } else {
        config.max_fanout
    };
    let selected: Vec<&ScoredSource> = candidates.iter().take(fanout).collect();
    let fallback: Vec<String> = candidates
        .iter()
        .skip(fanout)
        .map(|c| c.descriptor.id.clone())
        .collect();
    if !fallback.is_empty() {
        strategies.push("fallback_overflow".to_string());
    }

    // 5. Confidence: location confidence weighted by how many selected
    //    sources are country-specific (trusted over global fallback).
    let specific = selected.iter().filter(|c| c.country_specific).count();
    let specific_fraction = specific as f64 / selected.len() as f64;
    let confidence_score = (ctx.location.confidence * (0.5 + 0.5 * specific_fraction)).clamp(0.0, 1.0);

    // 6. Coverage heuristic from the rolling per-source averages.
    let mut expected_events = 0.0;
    for c in &selected {
        expected_events += stats
            .expected_events(&c.descriptor.id, config.default_expected_events)
            .await;
    }
    let estimated_coverage = (expected_events / ctx.limit.max(1) as f64).clamp(0.0, 1.0);

    let selected_ids: Vec<String> = selected.iter().map(|c| c.descriptor.id.clone()).collect();
    debug!(
        selected = ?selected_ids,
        fallback = fallback.len(),
        confidence = confidence_score,
        coverage = estimated_coverage,
        "routing decision"
    );
    metrics::router::decision(selected_ids.len(), fallback.len());

    RoutingDecision {
        selected_sources: selected_ids,
        fallback_sources: fallback,
        confidence_score,
        estimated_coverage,
        strategies_used: strategies,
    }
}

/// Score = region specificity (dominant) + category match quality.
/// Declared priority only breaks ties.
fn score(descriptor: &SourceDescriptor, category: EventCategory, country_specific: bool) -> f64 {
    let region_weight = if country_specific { 1.0 } else { 0.4 };
    let category_weight = if descriptor.supported_categories.contains(&category) {
        1.0
    } else {
        // reachable only through the General capability
        0.5
    };
    region_weight * 2.0 + category_weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResolvedLocation, SpeedTier};
    use std::collections::HashSet;
    use uuid::Uuid;

    fn descriptor(id: &str, regions: &[&str], categories: &[EventCategory], priority: u32) -> SourceDescriptor {
        SourceDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            supported_regions: regions.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            supported_categories: categories.to_vec(),
            speed_tier: SpeedTier::Medium,
            enabled_by_default: true,
            priority,
            endpoint_template: None,
        }
    }

    fn barcelona_ctx(category: EventCategory) -> RoutingContext {
        RoutingContext {
            request_id: Uuid::new_v4(),
            raw_query: "música en Barcelona".to_string(),
            location: ResolvedLocation {
                city: "Barcelona".to_string(),
                region: Some("Cataluña".to_string()),
                country: "España".to_string(),
                country_code: "ES".to_string(),
                latitude: Some(41.39),
                longitude: Some(2.17),
                confidence: 0.9,
            },
            category,
            limit: 50,
            comprehensive: false,
            budget_hint: None,
        }
    }

    #[tokio::test]
    async fn fanout_never_exceeds_cap() {
        let available: Vec<SourceDescriptor> = (0..12)
            .map(|i| descriptor(&format!("s{i}"), &["global"], &[EventCategory::General], i))
            .collect();
        let stats = SourceStatsTable::new();
        let config = RouterConfig::default();
        let decision = route(&barcelona_ctx(EventCategory::Music), &available, &stats, &config).await;
        assert!(decision.selected_sources.len() <= config.max_fanout);
        assert_eq!(
            decision.selected_sources.len() + decision.fallback_sources.len(),
            12
        );
    }

    #[tokio::test]
    async fn country_specific_sources_outrank_global_ones() {
        let available = vec![
            descriptor("global_events", &["global"], &[EventCategory::General], 0),
            descriptor("entradium", &["es", "españa"], &[EventCategory::Music, EventCategory::Theatre], 10),
        ];
        let stats = SourceStatsTable::new();
        let decision = route(
            &barcelona_ctx(EventCategory::Music),
            &available,
            &stats,
            &RouterConfig::default(),
        )
        .await;
        assert_eq!(decision.selected_sources[0], "entradium");
        assert!(decision.selected_sources.contains(&"global_events".to_string()));
    }

    #[tokio::test]
    async fn specialty_sources_join_even_when_not_default_enabled() {
        let mut sports_only = descriptor("fixturelist", &["global"], &[EventCategory::Sports], 3);
        sports_only.enabled_by_default = false;
        let available = vec![
            sports_only,
            descriptor("eventbrite", &["global"], &[EventCategory::General], 1),
        ];
        let stats = SourceStatsTable::new();
        let decision = route(
            &barcelona_ctx(EventCategory::Sports),
            &available,
            &stats,
            &RouterConfig::default(),
        )
        .await;
        assert!(decision.selected_sources.contains(&"fixturelist".to_string()));
        assert!(decision.strategies_used.contains(&"specialty".to_string()));
    }

    #[tokio::test]
    async fn zero_matches_is_no_coverage_not_an_error() {
        let available = vec![descriptor("ticketek", &["ar"], &[EventCategory::Music], 0)];
        let mut ctx = barcelona_ctx(EventCategory::Music);
        ctx.location.country = "Iceland".to_string();
        ctx.location.country_code = "IS".to_string();
        let stats = SourceStatsTable::new();
        let decision = route(&ctx, &available, &stats, &RouterConfig::default()).await;
        assert!(decision.is_empty());
        assert_eq!(decision.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn ties_break_by_priority_ascending() {
        let available = vec![
            descriptor("b_source", &["global"], &[EventCategory::Music], 2),
            descriptor("a_source", &["global"], &[EventCategory::Music], 1),
        ];
        let stats = SourceStatsTable::new();
        let decision = route(
            &barcelona_ctx(EventCategory::Music),
            &available,
            &stats,
            &RouterConfig::default(),
        )
        .await;
        assert_eq!(decision.selected_sources, vec!["a_source", "b_source"]);
    }

    #[tokio::test]
    async fn coverage_estimate_uses_rolling_stats() {
        let available = vec![descriptor("eventbrite", &["global"], &[EventCategory::General], 0)];
        let stats = SourceStatsTable::new();
        stats.record("eventbrite", true, 500, 40).await;
        let decision = route(
            &barcelona_ctx(EventCategory::Music),
            &available,
            &stats,
            &RouterConfig::default(),
        )
        .await;
        // 40 historical events against a limit of 50
        assert!((decision.estimated_coverage - 0.8).abs() < 1e-9);
    }
}
