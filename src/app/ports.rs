use async_trait::async_trait;

use crate::common::error::Result;
use crate::domain::{EventCategory, ResolvedLocation};

/// Location inferred by an external collaborator (AI-backed or geocoder).
#[derive(Debug, Clone)]
pub struct InferredLocation {
    pub city: String,
    pub province: Option<String>,
    pub country: String,
    pub country_code: Option<String>,
    pub confidence: f64,
}

/// Collaborator port for free-text location inference. The resolver only
/// calls this after its alias table and gazetteer both miss.
#[async_trait]
pub trait LocationInferrer: Send + Sync {
    async fn infer(&self, query: &str) -> Result<Option<InferredLocation>>;
}

/// Collaborator port for expensive URL synthesis (AI-backed in production).
/// Returns None when the collaborator cannot produce a URL for the source.
#[async_trait]
pub trait UrlSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        source_id: &str,
        location: &ResolvedLocation,
        category: Option<EventCategory>,
    ) -> Result<Option<String>>;
}
