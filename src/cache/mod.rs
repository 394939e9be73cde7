//! Persisted URL pattern cache.
//!
//! Synthesizing a source URL is slow and expensive (AI-backed collaborator),
//! so successful resolutions are distilled into a reusable template keyed by
//! (source, location class — typically country) and persisted across
//! restarts. A cached hit is a pure string substitution with no external
//! call. Concurrent misses on the same key are collapsed into a single
//! in-flight synthesis.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::UrlSynthesizer;
use crate::common::error::{EngineError, Result};
use crate::domain::ResolvedLocation;
use crate::observability::metrics;

const CACHE_FILE_VERSION: u32 = 1;
/// After this many consecutive failures an entry is bypassed and
/// re-synthesized on next use instead of waiting for the sweep.
const FAILURE_RETRY_THRESHOLD: u32 = 3;
/// Entries untested for this long are re-verified by the sweep.
const SWEEP_STALE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
    Flagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternEntry {
    pub pattern: String,
    pub example: String,
    pub confidence: f64,
    pub last_tested: DateTime<Utc>,
    pub status: PatternStatus,
    #[serde(default)]
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub total_patterns: usize,
    pub cache_hits: u64,
    pub ai_calls_saved: u64,
    pub next_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    last_updated: DateTime<Utc>,
    patterns: HashMap<String, PatternEntry>,
    metadata: CacheMetadata,
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: CACHE_FILE_VERSION,
            last_updated: Utc::now(),
            patterns: HashMap::new(),
            metadata: CacheMetadata::default(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub restored: usize,
    pub still_failing: usize,
}

pub struct UrlPatternCache {
    path: PathBuf,
    synthesizer: Arc<dyn UrlSynthesizer>,
    state: Mutex<CacheFile>,
    // Per-key guards enforcing the single-resolution-in-flight invariant.
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UrlPatternCache {
    /// Load the persisted cache, or start empty when no file exists yet.
    pub fn load<P: AsRef<Path>>(path: P, synthesizer: Arc<dyn UrlSynthesizer>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("unreadable pattern cache, starting empty: {}", e);
                CacheFile::default()
            })
        } else {
            CacheFile::default()
        };
        info!(patterns = state.patterns.len(), path = %path.display(), "URL pattern cache loaded");
        Ok(Self {
            path,
            synthesizer,
            state: Mutex::new(state),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve the query URL for a source and location. Cache hit is O(1)
    /// template substitution; a miss delegates to the synthesis collaborator
    /// exactly once per key regardless of concurrent callers.
    #[instrument(skip(self, location), fields(city = %location.city))]
    pub async fn resolve_url(&self, source_id: &str, location: &ResolvedLocation) -> Result<String> {
        let key = cache_key(source_id, location);

        if let Some(url) = self.try_apply(&key, location).await {
            metrics::cache::hit(source_id);
            return Ok(url);
        }
        metrics::cache::miss(source_id);

        let key_lock = self.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        // A concurrent caller may have finished the synthesis while this
        // one waited on the key lock.
        if let Some(url) = self.try_apply(&key, location).await {
            metrics::cache::hit(source_id);
            return Ok(url);
        }

        debug!(key = %key, "cache miss; delegating to URL synthesis");
        metrics::cache::synthesis(source_id);
        let url = self
            .synthesizer
            .synthesize(source_id, location, None)
            .await?
            .ok_or_else(|| EngineError::Synthesis {
                source_id: source_id.to_string(),
                message: "collaborator returned no URL".to_string(),
            })?;

        let (pattern, confidence) = extract_pattern(&url, location);
        {
            // Re-synthesis after a bypass updates the existing key in place.
            let mut state = self.state.lock().await;
            state.patterns.insert(
                key,
                PatternEntry {
                    pattern,
                    example: url.clone(),
                    confidence,
                    last_tested: Utc::now(),
                    status: PatternStatus::Active,
                    consecutive_failures: 0,
                },
            );
            state.metadata.total_patterns = state.patterns.len();
            state.last_updated = Utc::now();
        }
        self.flush().await?;
        Ok(url)
    }

    /// Apply a usable cached pattern, bumping the hit counters.
    async fn try_apply(&self, key: &str, location: &ResolvedLocation) -> Option<String> {
        let mut state = self.state.lock().await;
        let entry = state.patterns.get(key)?;
        if entry.consecutive_failures >= FAILURE_RETRY_THRESHOLD {
            // Too many failures: bypass and let the caller re-synthesize.
            return None;
        }
        let url = apply_pattern(&entry.pattern, location);
        state.metadata.cache_hits += 1;
        state.metadata.ai_calls_saved += 1;
        Some(url)
    }

    /// Flag an entry after a failed fetch. Entries are never auto-deleted,
    /// only flagged; the sweep (or the retry threshold) deals with them.
    pub async fn record_failure(&self, source_id: &str, location: &ResolvedLocation) {
        let key = cache_key(source_id, location);
        let mut state = self.state.lock().await;
        if let Some(entry) = state.patterns.get_mut(&key) {
            entry.status = PatternStatus::Flagged;
            entry.consecutive_failures += 1;
            entry.confidence = (entry.confidence * 0.5).max(0.05);
            debug!(key = %key, failures = entry.consecutive_failures, "pattern flagged");
        }
    }

    /// Clear failure state after a successful fetch through the pattern.
    pub async fn record_success(&self, source_id: &str, location: &ResolvedLocation) {
        let key = cache_key(source_id, location);
        let mut state = self.state.lock().await;
        if let Some(entry) = state.patterns.get_mut(&key) {
            entry.status = PatternStatus::Active;
            entry.consecutive_failures = 0;
            entry.confidence = (entry.confidence + 0.05).min(1.0);
            entry.last_tested = Utc::now();
        }
    }

    /// Seed a pattern directly (registry bootstrap and tests).
    pub async fn insert_pattern(&self, source_id: &str, location_class: &str, pattern: &str, example: &str) {
        let key = format!("{source_id}:{location_class}");
        let mut state = self.state.lock().await;
        state.patterns.insert(
            key,
            PatternEntry {
                pattern: pattern.to_string(),
                example: example.to_string(),
                confidence: 0.9,
                last_tested: Utc::now(),
                status: PatternStatus::Active,
                consecutive_failures: 0,
            },
        );
        state.metadata.total_patterns = state.patterns.len();
    }

    /// Re-verify flagged and stale entries over HTTP, updating confidence
    /// and `last_tested` in place. Nothing is deleted.
    pub async fn sweep(&self, client: &reqwest::Client) -> Result<SweepReport> {
        let candidates: Vec<(String, String)> = {
            let state = self.state.lock().await;
            let stale_before = Utc::now() - ChronoDuration::days(SWEEP_STALE_DAYS);
            state
                .patterns
                .iter()
                .filter(|(_, e)| e.status == PatternStatus::Flagged || e.last_tested < stale_before)
                .map(|(k, e)| (k.clone(), e.example.clone()))
                .collect()
        };

        let mut report = SweepReport::default();
        for (key, example) in candidates {
            report.checked += 1;
            let ok = match client.get(&example).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(_) => false,
            };
            let mut state = self.state.lock().await;
            if let Some(entry) = state.patterns.get_mut(&key) {
                entry.last_tested = Utc::now();
                if ok {
                    entry.status = PatternStatus::Active;
                    entry.consecutive_failures = 0;
                    entry.confidence = (entry.confidence + 1.0) / 2.0;
                    report.restored += 1;
                } else {
                    entry.status = PatternStatus::Flagged;
                    entry.confidence = (entry.confidence * 0.5).max(0.05);
                    report.still_failing += 1;
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            state.metadata.next_update = Some(Utc::now() + ChronoDuration::days(SWEEP_STALE_DAYS));
        }
        self.flush().await?;
        info!(checked = report.checked, restored = report.restored, "pattern sweep finished");
        Ok(report)
    }

    pub async fn metadata(&self) -> CacheMetadata {
        self.state.lock().await.metadata.clone()
    }

    /// Persist the current state to disk.
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Final flush; call before shutdown.
    pub async fn close(&self) -> Result<()> {
        self.flush().await
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

/// Cache key: source plus location class. Patterns generalize across cities
/// within a country, so the class is the country slug.
pub fn cache_key(source_id: &str, location: &ResolvedLocation) -> String {
    format!("{}:{}", source_id, location_class(location))
}

pub fn location_class(location: &ResolvedLocation) -> String {
    let country = if location.country.is_empty() || location.country == "unknown" {
        &location.city
    } else {
        &location.country
    };
    slug(country)
}

/// Turn a synthesized URL back into a reusable template by replacing the
/// location tokens with placeholders. A URL that carries no recognizable
/// token still caches, just with less confidence.
fn extract_pattern(url: &str, location: &ResolvedLocation) -> (String, f64) {
    let mut pattern = url.to_string();
    let mut found = false;
    let city = slug(&location.city);
    if !city.is_empty() && pattern.contains(&city) {
        pattern = pattern.replace(&city, "{city}");
        found = true;
    }
    let country = slug(&location.country);
    if !country.is_empty() && pattern.contains(&country) {
        pattern = pattern.replace(&country, "{country}");
        found = true;
    }
    if found {
        (pattern, 0.9)
    } else {
        (pattern, 0.5)
    }
}

fn apply_pattern(pattern: &str, location: &ResolvedLocation) -> String {
    pattern
        .replace("{city}", &slug(&location.city))
        .replace("{country}", &slug(&location.country))
}

/// URL-safe lowercase slug with common diacritics folded.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.to_lowercase().chars() {
        let folded = match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        };
        if folded.is_ascii_alphanumeric() {
            out.push(folded);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSynthesizer {
        calls: AtomicUsize,
        url: String,
    }

    impl CountingSynthesizer {
        fn new(url: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                url: url.to_string(),
            })
        }
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UrlSynthesizer for CountingSynthesizer {
        async fn synthesize(
            &self,
            _source_id: &str,
            _location: &ResolvedLocation,
            _category: Option<crate::domain::EventCategory>,
        ) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(Some(self.url.clone()))
        }
    }

    fn mendoza() -> ResolvedLocation {
        ResolvedLocation {
            city: "Mendoza".to_string(),
            region: Some("Mendoza".to_string()),
            country: "Argentina".to_string(),
            country_code: "AR".to_string(),
            latitude: None,
            longitude: None,
            confidence: 0.9,
        }
    }

    fn cache_with(synth: Arc<CountingSynthesizer>) -> (tempfile::TempDir, Arc<UrlPatternCache>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = UrlPatternCache::load(dir.path().join("patterns.json"), synth).unwrap();
        (dir, Arc::new(cache))
    }

    #[tokio::test]
    async fn second_resolution_skips_synthesis() {
        let synth = CountingSynthesizer::new("https://x.com/d/argentina/mendoza/");
        let (_dir, cache) = cache_with(Arc::clone(&synth));

        let first = cache.resolve_url("eventbrite", &mendoza()).await.unwrap();
        let second = cache.resolve_url("eventbrite", &mendoza()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn seeded_pattern_applies_with_zero_synthesis_calls() {
        let synth = CountingSynthesizer::new("https://unused.example/");
        let (_dir, cache) = cache_with(Arc::clone(&synth));
        cache
            .insert_pattern("eventbrite", "argentina", "https://x.com/d/argentina/{city}/", "https://x.com/d/argentina/cordoba/")
            .await;

        let url = cache.resolve_url("eventbrite", &mendoza()).await.unwrap();
        assert_eq!(url, "https://x.com/d/argentina/mendoza/");
        assert_eq!(synth.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_synthesis() {
        let synth = CountingSynthesizer::new("https://x.com/d/argentina/mendoza/");
        let (_dir, cache) = cache_with(Arc::clone(&synth));

        let a = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve_url("eventbrite", &mendoza()).await })
        };
        let b = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.resolve_url("eventbrite", &mendoza()).await })
        };
        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a, b);
        assert_eq!(synth.calls(), 1);
    }

    #[tokio::test]
    async fn failures_flag_but_never_delete() {
        let synth = CountingSynthesizer::new("https://x.com/d/argentina/mendoza/");
        let (_dir, cache) = cache_with(Arc::clone(&synth));
        cache.resolve_url("eventbrite", &mendoza()).await.unwrap();

        cache.record_failure("eventbrite", &mendoza()).await;
        cache.record_failure("eventbrite", &mendoza()).await;
        // still served from cache below the retry threshold
        cache.resolve_url("eventbrite", &mendoza()).await.unwrap();
        assert_eq!(synth.calls(), 1);

        // third failure crosses the threshold: next resolve re-synthesizes
        cache.record_failure("eventbrite", &mendoza()).await;
        cache.resolve_url("eventbrite", &mendoza()).await.unwrap();
        assert_eq!(synth.calls(), 2);

        let meta = cache.metadata().await;
        assert_eq!(meta.total_patterns, 1);
    }

    #[tokio::test]
    async fn cache_persists_across_reload() {
        let synth = CountingSynthesizer::new("https://x.com/d/argentina/mendoza/");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.json");
        {
            let cache = UrlPatternCache::load(&path, Arc::clone(&synth) as Arc<dyn UrlSynthesizer>).unwrap();
            cache.resolve_url("eventbrite", &mendoza()).await.unwrap();
            cache.close().await.unwrap();
        }
        let reloaded = UrlPatternCache::load(&path, Arc::clone(&synth) as Arc<dyn UrlSynthesizer>).unwrap();
        reloaded.resolve_url("eventbrite", &mendoza()).await.unwrap();
        assert_eq!(synth.calls(), 1);
    }

    #[test]
    fn slug_folds_diacritics() {
        assert_eq!(slug("España"), "espana");
        assert_eq!(slug("Ciudad de México"), "ciudad-de-mexico");
    }

    #[test]
    fn pattern_extraction_replaces_location_tokens() {
        let loc = mendoza();
        let (pattern, confidence) = extract_pattern("https://x.com/d/argentina/mendoza/", &loc);
        assert_eq!(pattern, "https://x.com/d/{country}/{city}/");
        assert!((confidence - 0.9).abs() < f64::EPSILON);

        let (pattern, confidence) = extract_pattern("https://x.com/api/v2/search", &loc);
        assert_eq!(pattern, "https://x.com/api/v2/search");
        assert!((confidence - 0.5).abs() < f64::EPSILON);
    }
}
