//! Generic HTTP JSON source.
//!
//! Registry sources without hand-written adapters are served by this one
//! implementation: the query URL comes from the pattern cache, the response
//! is expected to be JSON, and the event list is pulled out of the common
//! envelope keys. Anything deeper (HTML scraping, per-source field quirks)
//! belongs to external collaborator adapters, not here.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};

use crate::cache::UrlPatternCache;
use crate::common::error::{EngineError, Result};
use crate::domain::{RawEventData, ResolvedLocation};
use crate::observability::metrics;

use super::EventSource;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Envelope keys commonly wrapping the event array in JSON responses.
const ENVELOPE_KEYS: &[&str] = &["events", "results", "data", "items", "hits"];

pub struct HttpJsonSource {
    source_id: String,
    client: reqwest::Client,
    cache: Arc<UrlPatternCache>,
}

impl HttpJsonSource {
    pub fn new(source_id: &str, client: reqwest::Client, cache: Arc<UrlPatternCache>) -> Self {
        Self {
            source_id: source_id.to_string(),
            client,
            cache,
        }
    }
}

#[async_trait::async_trait]
impl EventSource for HttpJsonSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    #[instrument(skip(self, location), fields(source_id = %self.source_id, city = %location.city))]
    async fn fetch(&self, location: &ResolvedLocation, limit: usize) -> Result<Vec<RawEventData>> {
        let url = self.cache.resolve_url(&self.source_id, location).await?;
        debug!(url = %url, "fetching source");

        let started = Instant::now();
        let outcome = self.fetch_url(&url, limit).await;
        metrics::sources::request_duration(&self.source_id, started.elapsed().as_secs_f64());

        match outcome {
            Ok(events) => {
                metrics::sources::request_success(&self.source_id);
                self.cache.record_success(&self.source_id, location).await;
                Ok(events)
            }
            Err(e) => {
                warn!(error = %e, "source fetch failed");
                metrics::sources::request_error(&self.source_id);
                self.cache.record_failure(&self.source_id, location).await;
                Err(e)
            }
        }
    }
}

impl HttpJsonSource {
    async fn fetch_url(&self, url: &str, limit: usize) -> Result<Vec<RawEventData>> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Source {
                source_id: self.source_id.clone(),
                message: format!("unexpected status {status}"),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let mut events = extract_event_array(&body);
        events.truncate(limit);
        debug!(events = events.len(), "source responded");
        Ok(events)
    }
}

/// Pull the event list out of a JSON response: a top-level array, one of the
/// common envelope keys, or a single object treated as one event.
pub fn extract_event_array(body: &serde_json::Value) -> Vec<RawEventData> {
    if let Some(array) = body.as_array() {
        return array.clone();
    }
    if let Some(obj) = body.as_object() {
        for key in ENVELOPE_KEYS {
            if let Some(array) = obj.get(*key).and_then(|v| v.as_array()) {
                return array.clone();
            }
        }
        // one level of nesting ("data": {"events": [...]})
        for value in obj.values() {
            if let Some(inner) = value.as_object() {
                for key in ENVELOPE_KEYS {
                    if let Some(array) = inner.get(*key).and_then(|v| v.as_array()) {
                        return array.clone();
                    }
                }
            }
        }
        if !obj.is_empty() {
            return vec![body.clone()];
        }
    }
    Vec::new()
}
