//! Hit/miss accounting

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::cache::CacheLayer;

/// Counters for one cache layer.
#[derive(Debug, Default)]
struct LayerCounters {
    hits_exact: AtomicU64,
    hits_semantic: AtomicU64,
    misses: AtomicU64,
    bytes_saved: AtomicU64,
    calls_avoided: AtomicU64,
}

impl LayerCounters {
    fn snapshot(&self) -> LayerStats {
        LayerStats {
            hits_exact: self.hits_exact.load(Ordering::Acquire),
            hits_semantic: self.hits_semantic.load(Ordering::Acquire),
            misses: self.misses.load(Ordering::Acquire),
            bytes_saved: self.bytes_saved.load(Ordering::Acquire),
            calls_avoided: self.calls_avoided.load(Ordering::Acquire),
        }
    }

    fn reset(&self) {
        self.hits_exact.store(0, Ordering::Release);
        self.hits_semantic.store(0, Ordering::Release);
        self.misses.store(0, Ordering::Release);
        self.bytes_saved.store(0, Ordering::Release);
        self.calls_avoided.store(0, Ordering::Release);
    }
}

/// Point-in-time copy of one layer's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LayerStats {
    pub hits_exact: u64,
    pub hits_semantic: u64,
    pub misses: u64,
    pub bytes_saved: u64,
    pub calls_avoided: u64,
}

impl LayerStats {
    pub fn hits(&self) -> u64 {
        self.hits_exact + self.hits_semantic
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;

        if total == 0 {
            return 0.0;
        }

        self.hits() as f64 / total as f64
    }
}

/// Snapshot across all layers, as exposed to reporting surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub input: LayerStats,
    pub prompt: LayerStats,
    pub response: LayerStats,
}

impl CacheStats {
    /// Generator invocations saved across the run.
    pub fn calls_avoided(&self) -> u64 {
        self.response.calls_avoided
    }
}

/// Thread-safe counters incremented on every lookup outcome.
///
/// Increments are single atomic adds and never block a lookup, no matter how
/// many readers are snapshotting. Counters are monotonic; only [`reset`]
/// zeroes them.
///
/// [`reset`]: StatsCollector::reset
#[derive(Debug, Default)]
pub struct StatsCollector {
    input: LayerCounters,
    prompt: LayerCounters,
    response: LayerCounters,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn layer(&self, layer: CacheLayer) -> &LayerCounters {
        match layer {
            CacheLayer::Input => &self.input,
            CacheLayer::Prompt => &self.prompt,
            CacheLayer::Response => &self.response,
        }
    }

    pub fn record_exact_hit(&self, layer: CacheLayer, bytes: u64) {
        let counters = self.layer(layer);
        counters.hits_exact.fetch_add(1, Ordering::AcqRel);
        counters.bytes_saved.fetch_add(bytes, Ordering::AcqRel);
        counters.calls_avoided.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_semantic_hit(&self, bytes: u64) {
        let counters = self.layer(CacheLayer::Response);
        counters.hits_semantic.fetch_add(1, Ordering::AcqRel);
        counters.bytes_saved.fetch_add(bytes, Ordering::AcqRel);
        counters.calls_avoided.fetch_add(1, Ordering::AcqRel);
    }

    pub fn record_miss(&self, layer: CacheLayer) {
        self.layer(layer).misses.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            input: self.input.snapshot(),
            prompt: self.prompt.snapshot(),
            response: self.response.snapshot(),
        }
    }

    pub fn reset(&self) {
        self.input.reset();
        self.prompt.reset();
        self.response.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_record_and_snapshot() {
        let stats = StatsCollector::new();

        stats.record_exact_hit(CacheLayer::Input, 10);
        stats.record_exact_hit(CacheLayer::Response, 100);
        stats.record_semantic_hit(200);
        stats.record_miss(CacheLayer::Response);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.input.hits_exact, 1);
        assert_eq!(snapshot.input.bytes_saved, 10);
        assert_eq!(snapshot.response.hits_exact, 1);
        assert_eq!(snapshot.response.hits_semantic, 1);
        assert_eq!(snapshot.response.bytes_saved, 300);
        assert_eq!(snapshot.response.misses, 1);
        assert_eq!(snapshot.calls_avoided(), 2);
    }

    #[test]
    fn test_hit_rate() {
        let stats = StatsCollector::new();

        stats.record_exact_hit(CacheLayer::Prompt, 1);
        stats.record_exact_hit(CacheLayer::Prompt, 1);
        stats.record_miss(CacheLayer::Prompt);
        stats.record_miss(CacheLayer::Prompt);

        let snapshot = stats.snapshot();
        assert!((snapshot.prompt.hit_rate() - 0.5).abs() < 0.001);
        assert_eq!(LayerStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_reset() {
        let stats = StatsCollector::new();
        stats.record_exact_hit(CacheLayer::Response, 64);

        stats.reset();
        assert_eq!(stats.snapshot(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let stats = Arc::new(StatsCollector::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    stats.record_exact_hit(CacheLayer::Response, 1);
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.response.hits_exact, 800);
        assert_eq!(snapshot.response.bytes_saved, 800);
    }
}
