use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Rolling per-source performance numbers. Updated after every
/// `ExecutionResult`; consumed by the router's coverage heuristic.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub total_runs: u64,
    pub successes: u64,
    pub avg_time_ms: f64,
    pub avg_event_count: f64,
}

impl SourceStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total_runs as f64
    }
}

/// Process-wide rolling stats table. Writes are merge-style running
/// averages, never destructive overwrites of another writer's update.
#[derive(Debug, Default)]
pub struct SourceStatsTable {
    inner: RwLock<HashMap<String, SourceStats>>,
}

impl SourceStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, source_id: &str, success: bool, elapsed_ms: u64, event_count: usize) {
        let mut table = self.inner.write().await;
        let stats = table.entry(source_id.to_string()).or_default();
        stats.total_runs += 1;
        if success {
            stats.successes += 1;
        }
        let n = stats.total_runs as f64;
        stats.avg_time_ms += (elapsed_ms as f64 - stats.avg_time_ms) / n;
        stats.avg_event_count += (event_count as f64 - stats.avg_event_count) / n;
    }

    pub async fn get(&self, source_id: &str) -> Option<SourceStats> {
        self.inner.read().await.get(source_id).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, SourceStats> {
        self.inner.read().await.clone()
    }

    /// Average events a source has historically returned, or a neutral
    /// default for sources that never ran.
    pub async fn expected_events(&self, source_id: &str, default: f64) -> f64 {
        match self.inner.read().await.get(source_id) {
            Some(s) if s.total_runs > 0 => s.avg_event_count * s.success_rate(),
            _ => default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rolling_averages_converge() {
        let table = SourceStatsTable::new();
        table.record("src", true, 100, 10).await;
        table.record("src", true, 300, 20).await;
        let stats = table.get("src").await.unwrap();
        assert_eq!(stats.total_runs, 2);
        assert!((stats.avg_time_ms - 200.0).abs() < f64::EPSILON);
        assert!((stats.avg_event_count - 15.0).abs() < f64::EPSILON);
        assert!((stats.success_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn failures_discount_expected_events() {
        let table = SourceStatsTable::new();
        table.record("flaky", true, 100, 10).await;
        table.record("flaky", false, 100, 0).await;
        // success rate 0.5, avg events 5.0 -> expectation 2.5
        let expected = table.expected_events("flaky", 8.0).await;
        assert!((expected - 2.5).abs() < 1e-9);
        // unknown source falls back to the provided default
        assert!((table.expected_events("new", 8.0).await - 8.0).abs() < f64::EPSILON);
    }
}
