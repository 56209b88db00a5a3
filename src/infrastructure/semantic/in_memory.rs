//! In-memory semantic index using linear scan over copy-on-write snapshots

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::DomainResult;
use crate::domain::cache::CacheKey;
use crate::domain::embedding::cosine_similarity;
use crate::domain::semantic::{IndexEntry, SemanticIndex, SemanticMatch};

/// Brute-force cosine-similarity index.
///
/// Searches load the current snapshot with a single atomic pointer read and
/// scan it without holding any lock, so a pending insert never stalls a
/// lookup. Inserts take the writer mutex, build a new snapshot and swap it
/// in. Linear scan is the right trade below roughly 100k entries; a proximity
/// graph can replace this behind the same trait.
#[derive(Debug)]
pub struct InMemorySemanticIndex {
    snapshot: ArcSwap<Vec<IndexEntry>>,
    /// Serializes inserts and removals relative to each other
    writer: Mutex<()>,
}

impl InMemorySemanticIndex {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }
}

impl Default for InMemorySemanticIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemanticIndex for InMemorySemanticIndex {
    async fn insert(&self, entry: IndexEntry) -> DomainResult<()> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot.load();

        if current.iter().any(|e| e.key == entry.key) {
            return Ok(());
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(entry);

        self.snapshot.store(Arc::new(next));
        Ok(())
    }

    async fn search(&self, query: &[f32], threshold: f32) -> DomainResult<Option<SemanticMatch>> {
        let snapshot = self.snapshot.load_full();

        let best = snapshot
            .iter()
            .map(|entry| SemanticMatch {
                key: entry.key,
                similarity: cosine_similarity(query, &entry.embedding),
            })
            .filter(|m| m.similarity >= threshold)
            .max_by(|a, b| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

        Ok(best)
    }

    async fn remove(&self, key: &CacheKey) -> DomainResult<bool> {
        let _guard = self.writer.lock().await;
        let current = self.snapshot.load();

        if !current.iter().any(|e| e.key == *key) {
            return Ok(false);
        }

        let next: Vec<IndexEntry> = current.iter().filter(|e| e.key != *key).cloned().collect();
        self.snapshot.store(Arc::new(next));
        Ok(true)
    }

    async fn len(&self) -> DomainResult<usize> {
        Ok(self.snapshot.load().len())
    }

    async fn clear(&self) -> DomainResult<()> {
        let _guard = self.writer.lock().await;
        self.snapshot.store(Arc::new(Vec::new()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::KeyGenerator;

    fn key(name: &str) -> CacheKey {
        KeyGenerator::new().input_key(name)
    }

    fn entry(name: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry::new(key(name), embedding, 0)
    }

    #[tokio::test]
    async fn test_insert_and_search_identical() {
        let index = InMemorySemanticIndex::new();
        index.insert(entry("a", vec![1.0, 0.0, 0.0])).await.unwrap();

        let result = index.search(&[1.0, 0.0, 0.0], 0.9).await.unwrap().unwrap();
        assert_eq!(result.key, key("a"));
        assert!((result.similarity - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let index = InMemorySemanticIndex::new();
        assert!(index.search(&[1.0, 0.0], 0.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_threshold_boundary() {
        // cos([1,0], [0.96,0.28]) == 0.96
        let index = InMemorySemanticIndex::new();
        index.insert(entry("near", vec![0.96, 0.28])).await.unwrap();

        let hit = index.search(&[1.0, 0.0], 0.95).await.unwrap();
        assert!(hit.is_some());
        assert!((hit.unwrap().similarity - 0.96).abs() < 0.001);

        let miss = index.search(&[1.0, 0.0], 0.97).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_returns_single_best_match() {
        let index = InMemorySemanticIndex::new();
        index.insert(entry("far", vec![0.8, 0.6])).await.unwrap();
        index.insert(entry("near", vec![0.99, 0.14])).await.unwrap();
        index.insert(entry("mid", vec![0.9, 0.43])).await.unwrap();

        let best = index.search(&[1.0, 0.0], 0.5).await.unwrap().unwrap();
        assert_eq!(best.key, key("near"));
    }

    #[tokio::test]
    async fn test_insert_same_key_is_noop() {
        let index = InMemorySemanticIndex::new();
        index.insert(entry("a", vec![1.0, 0.0])).await.unwrap();
        index.insert(entry("a", vec![0.0, 1.0])).await.unwrap();

        assert_eq!(index.len().await.unwrap(), 1);

        // The original embedding won
        let hit = index.search(&[1.0, 0.0], 0.9).await.unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn test_remove() {
        let index = InMemorySemanticIndex::new();
        index.insert(entry("a", vec![1.0, 0.0])).await.unwrap();

        assert!(index.remove(&key("a")).await.unwrap());
        assert!(!index.remove(&key("a")).await.unwrap());
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let index = InMemorySemanticIndex::new();
        index.insert(entry("a", vec![1.0, 0.0])).await.unwrap();
        index.insert(entry("b", vec![0.0, 1.0])).await.unwrap();

        index.clear().await.unwrap();
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let index = Arc::new(InMemorySemanticIndex::new());
        let mut handles = Vec::new();

        for i in 0..16 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                let e = IndexEntry::new(
                    KeyGenerator::new().input_key(&format!("k{}", i)),
                    vec![i as f32, 1.0],
                    i as u64,
                );
                index.insert(e).await.unwrap();
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(index.len().await.unwrap(), 16);
    }
}
