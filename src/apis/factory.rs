//! Builds the runtime source catalog from registry descriptors.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::UrlPatternCache;
use crate::registry::SourceRegistry;

use super::http_source::HttpJsonSource;
use super::SourceCatalog;

/// One generic HTTP JSON source per registry descriptor, all sharing one
/// connection pool. Hand-written adapters for individual sources register
/// over these by id.
pub fn build_catalog(registry: &SourceRegistry, cache: &Arc<UrlPatternCache>) -> SourceCatalog {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .gzip(true)
        .build()
        .unwrap_or_default();

    let mut catalog = SourceCatalog::new();
    for descriptor in registry.descriptors() {
        catalog.register(Arc::new(HttpJsonSource::new(
            &descriptor.id,
            client.clone(),
            Arc::clone(cache),
        )));
    }
    catalog
}
