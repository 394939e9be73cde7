//! Search use case: resolver -> router -> engine -> canonicalizer, streamed.
//!
//! The returned channel carries one message per execution result the moment
//! it exists, then a final summary. The deterministic dedup merge happens
//! once, at the end, over everything the waves produced.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::canonical::{self, dedup};
use crate::common::error::{EngineError, Result};
use crate::domain::{CanonicalEvent, ResolvedLocation, RoutingContext, RoutingDecision};
use crate::engine::ExecutionEngine;
use crate::registry::SourceRegistry;
use crate::resolver::{gazetteer, IntentResolver, ResolveOptions};
use crate::router::{self, RouterConfig};

use super::messages::{
    LocationHint, SearchMessage, SearchRequest, SearchSummary, SourceErrorDetail, SourceTiming,
};

const MESSAGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Result limit when the request carries none.
    pub default_limit: usize,
    /// How many nearby cities the explicit expansion mode adds.
    pub nearby_cities: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            nearby_cities: 2,
        }
    }
}

/// Collected (non-streaming) form of a finished search.
#[derive(Debug)]
pub struct SearchResponse {
    pub no_coverage: bool,
    pub events: Vec<CanonicalEvent>,
    pub summary: Option<SearchSummary>,
}

pub struct SearchService {
    resolver: IntentResolver,
    registry: SourceRegistry,
    engine: ExecutionEngine,
    router_config: RouterConfig,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        resolver: IntentResolver,
        registry: SourceRegistry,
        engine: ExecutionEngine,
        router_config: RouterConfig,
        config: SearchConfig,
    ) -> Self {
        Self {
            resolver,
            registry,
            engine,
            router_config,
            config,
        }
    }

    /// Run a search and stream messages back as sources complete.
    ///
    /// The only `Err` surface is invalid input; everything downstream is
    /// absorbed into the stream as data. Dropping the receiver halts
    /// delivery without killing in-flight source tasks.
    #[instrument(skip(self, request), fields(query = %request.query))]
    pub async fn search(&self, request: SearchRequest) -> Result<mpsc::Receiver<SearchMessage>> {
        if request.query.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "query must not be empty".to_string(),
            ));
        }

        let ctx = self.resolve_request(&request).await;
        let available = self.registry.descriptors();
        let stats = self.engine.stats();
        let decision = router::route(&ctx, &available, &stats, &self.router_config).await;

        let (tx, rx) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);

        if decision.is_empty() {
            info!(location = %ctx.location.full_location(), "no coverage for location");
            let _ = tx
                .send(SearchMessage::NoCoverage {
                    location: ctx.location.full_location(),
                })
                .await;
            return Ok(rx);
        }

        // Waves: the primary decision, plus one per nearby city in the
        // explicit expansion mode. All reuse the same streaming primitive.
        let mut waves: Vec<(RoutingContext, RoutingDecision)> = Vec::new();
        let mut expanded_cities = Vec::new();
        if request.expand_nearby {
            for record in self
                .resolver
                .nearest_cities(&ctx.location.city, self.config.nearby_cities)
            {
                let nearby_ctx = RoutingContext {
                    location: ResolvedLocation {
                        city: record.city.to_string(),
                        region: Some(record.region.to_string()),
                        country: record.country.to_string(),
                        country_code: record.country_code.to_string(),
                        latitude: Some(record.latitude),
                        longitude: Some(record.longitude),
                        confidence: ctx.location.confidence * 0.9,
                    },
                    ..ctx.clone()
                };
                let nearby_decision =
                    router::route(&nearby_ctx, &available, &stats, &self.router_config).await;
                if !nearby_decision.is_empty() {
                    expanded_cities.push(record.city.to_string());
                    waves.push((nearby_ctx, nearby_decision));
                }
            }
        }
        waves.insert(0, (ctx.clone(), decision.clone()));

        let started_msg = SearchMessage::Started {
            request_id: ctx.request_id,
            query: request.query.clone(),
            location: ctx.location.full_location(),
            category: ctx.category,
            confidence: decision.confidence_score,
            estimated_coverage: decision.estimated_coverage,
            sources: decision.selected_sources.clone(),
            expanded_cities,
        };

        let engine = self.engine.clone();
        let priorities = self.registry.priorities();
        tokio::spawn(async move {
            let started = Instant::now();
            if tx.send(started_msg).await.is_err() {
                return;
            }

            let mut batches: Vec<Vec<CanonicalEvent>> = Vec::new();
            let mut summary = SearchSummary {
                request_id: ctx.request_id,
                success: true,
                total_events: 0,
                unique_events: 0,
                sources_completed: 0,
                sources_failed: 0,
                dropped_records: 0,
                duration_ms: 0,
                timings: Vec::new(),
                errors: Vec::new(),
            };

            for (wave_ctx, wave_decision) in &waves {
                let mut results = engine.execute_streaming(wave_ctx, wave_decision);
                while let Some(result) = results.recv().await {
                    summary.sources_completed += 1;

                    let message = if let Some(error) = result.error {
                        summary.sources_failed += 1;
                        summary.timings.push(SourceTiming {
                            source_id: result.source_id.clone(),
                            success: false,
                            execution_time_ms: result.execution_time_ms,
                            events: 0,
                        });
                        summary.errors.push(SourceErrorDetail {
                            source_id: result.source_id.clone(),
                            error: error.clone(),
                        });
                        SearchMessage::SourceError {
                            source_id: result.source_id,
                            error,
                            execution_time_ms: result.execution_time_ms,
                        }
                    } else {
                        let batch = canonical::canonicalize(&result.events, &result.source_id);
                        summary.total_events += batch.events.len();
                        summary.dropped_records += batch.dropped;
                        summary.timings.push(SourceTiming {
                            source_id: result.source_id.clone(),
                            success: true,
                            execution_time_ms: result.execution_time_ms,
                            events: batch.events.len(),
                        });
                        if batch.events.is_empty() {
                            SearchMessage::SourceEmpty {
                                source_id: result.source_id,
                                execution_time_ms: result.execution_time_ms,
                            }
                        } else {
                            batches.push(batch.events.clone());
                            SearchMessage::SourceCompleted {
                                source_id: result.source_id,
                                events: batch.events,
                                execution_time_ms: result.execution_time_ms,
                                dropped: batch.dropped,
                            }
                        }
                    };

                    if tx.send(message).await.is_err() {
                        debug!("consumer disconnected; abandoning search delivery");
                        return;
                    }
                }
            }

            let merged = dedup::merge(batches, &priorities);
            summary.unique_events = merged.len();
            summary.duration_ms = started.elapsed().as_millis() as u64;
            info!(
                total = summary.total_events,
                unique = summary.unique_events,
                failed = summary.sources_failed,
                duration_ms = summary.duration_ms,
                "search completed"
            );
            let _ = tx
                .send(SearchMessage::Completed {
                    events: merged,
                    summary,
                })
                .await;
        });

        Ok(rx)
    }

    /// Convenience wrapper that drains the stream into one response.
    pub async fn search_collect(&self, request: SearchRequest) -> Result<SearchResponse> {
        let mut rx = self.search(request).await?;
        let mut response = SearchResponse {
            no_coverage: false,
            events: Vec::new(),
            summary: None,
        };
        while let Some(message) = rx.recv().await {
            match message {
                SearchMessage::NoCoverage { .. } => response.no_coverage = true,
                SearchMessage::Completed { events, summary } => {
                    response.events = events;
                    response.summary = Some(summary);
                }
                _ => {}
            }
        }
        Ok(response)
    }

    async fn resolve_request(&self, request: &SearchRequest) -> RoutingContext {
        let city_hint = match &request.location_hint {
            Some(LocationHint::City { city }) => Some(city.clone()),
            Some(LocationHint::Coordinates { lat, lon }) => {
                gazetteer::nearest_to(*lat, *lon).map(|r| r.city.to_string())
            }
            None => None,
        };
        let opts = ResolveOptions {
            limit: request.limit.unwrap_or(self.config.default_limit),
            comprehensive: request.comprehensive,
            category_override: request.category,
            city_hint,
        };
        self.resolver.resolve_with(&request.query, opts).await
    }
}
