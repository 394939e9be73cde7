//! Concrete collaborator adapters.
//!
//! The production deployment plugs AI-backed collaborators into the ports in
//! `app::ports`; this module carries the adapters the binary can run with on
//! its own. URL synthesis falls back to the endpoint templates declared in
//! the source registry.

use async_trait::async_trait;
use tracing::debug;

use crate::app::ports::UrlSynthesizer;
use crate::cache::slug;
use crate::common::error::Result;
use crate::domain::{EventCategory, ResolvedLocation};
use crate::registry::SourceRegistry;

/// Synthesizes URLs from the registry's declared endpoint templates.
/// Returns None for sources without a template, which the cache surfaces as
/// a synthesis failure for that source.
pub struct TemplateUrlSynthesizer {
    registry: SourceRegistry,
}

impl TemplateUrlSynthesizer {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl UrlSynthesizer for TemplateUrlSynthesizer {
    async fn synthesize(
        &self,
        source_id: &str,
        location: &ResolvedLocation,
        _category: Option<EventCategory>,
    ) -> Result<Option<String>> {
        let Some(template) = self
            .registry
            .get(source_id)
            .and_then(|d| d.endpoint_template.clone())
        else {
            debug!(source_id, "no endpoint template declared");
            return Ok(None);
        };
        let url = template
            .replace("{city}", &slug(&location.city))
            .replace("{country}", &slug(&location.country));
        Ok(Some(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barcelona() -> ResolvedLocation {
        ResolvedLocation {
            city: "Barcelona".to_string(),
            region: Some("Cataluña".to_string()),
            country: "España".to_string(),
            country_code: "ES".to_string(),
            latitude: None,
            longitude: None,
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn templates_substitute_location_slugs() {
        let synth = TemplateUrlSynthesizer::new(SourceRegistry::with_builtins());
        let url = synth
            .synthesize("eventbrite", &barcelona(), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(url, "https://www.eventbrite.com/d/espana--barcelona/all-events/");
    }

    #[tokio::test]
    async fn sources_without_templates_yield_none() {
        let synth = TemplateUrlSynthesizer::new(SourceRegistry::with_builtins());
        let url = synth.synthesize("fixturelist", &barcelona(), None).await.unwrap();
        assert!(url.is_none());
    }
}
