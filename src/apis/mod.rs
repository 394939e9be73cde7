//! Source collaborator contract and the catalog the engine executes against.

pub mod factory;
pub mod http_source;

use std::collections::HashMap;
use std::sync::Arc;

use crate::common::error::Result;
use crate::domain::{RawEventData, ResolvedLocation};

/// Core trait every pluggable data source implements. Expected failures
/// (network error, empty result) surface as `Err`/empty `Ok`; the execution
/// engine additionally catches anything unexpected at the task boundary.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// Unique identifier for this source; must match its registry descriptor.
    fn source_id(&self) -> &str;

    /// Fetch up to `limit` raw events for the resolved location.
    async fn fetch(&self, location: &ResolvedLocation, limit: usize) -> Result<Vec<RawEventData>>;
}

/// Runtime lookup from source id to implementation.
#[derive(Default)]
pub struct SourceCatalog {
    sources: HashMap<String, Arc<dyn EventSource>>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn EventSource>) {
        self.sources.insert(source.source_id().to_string(), source);
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn EventSource>> {
        self.sources.get(source_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
