//! Application configuration.
//!
//! Read from `config.toml` when present; every field has a default so the
//! engine runs without one. `EVENTSCOUT_CONFIG` overrides the file path.

use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::common::error::Result;
use crate::engine::ExecutionConfig;
use crate::router::RouterConfig;

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Deserialize)]
pub struct EngineSection {
    pub max_concurrency: usize,
    pub source_timeout_secs: u64,
    pub coverage_threshold: f64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = ExecutionConfig::default();
        Self {
            max_concurrency: defaults.max_concurrency,
            source_timeout_secs: defaults.source_timeout.as_secs(),
            coverage_threshold: defaults.coverage_threshold,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RouterSection {
    pub max_fanout: usize,
    pub comprehensive_fanout: usize,
    pub default_expected_events: f64,
}

impl Default for RouterSection {
    fn default() -> Self {
        let defaults = RouterConfig::default();
        Self {
            max_fanout: defaults.max_fanout,
            comprehensive_fanout: defaults.comprehensive_fanout,
            default_expected_events: defaults.default_expected_events,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchSection {
    pub default_limit: usize,
    pub nearby_cities: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            default_limit: 50,
            nearby_cities: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheSection {
    pub path: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            path: "data/url_patterns.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistrySection {
    pub dir: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            dir: "registry/sources".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsSection {
    #[serde(default)]
    pub enabled: bool,
}

impl AppConfig {
    /// Load the configuration file, or defaults when none exists.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("EVENTSCOUT_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        if !std::path::Path::new(&path).exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_concurrency: self.engine.max_concurrency,
            source_timeout: Duration::from_secs(self.engine.source_timeout_secs),
            coverage_threshold: self.engine.coverage_threshold,
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            max_fanout: self.router.max_fanout,
            comprehensive_fanout: self.router.comprehensive_fanout,
            default_expected_events: self.router.default_expected_events,
        }
    }

    pub fn search_config(&self) -> crate::app::search::SearchConfig {
        crate::app::search::SearchConfig {
            default_limit: self.search.default_limit,
            nearby_cities: self.search.nearby_cities,
        }
    }
}
