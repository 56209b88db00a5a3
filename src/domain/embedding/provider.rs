//! Embedding provider trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainResult;

/// External embedding model boundary.
///
/// Implementations wrap a provider API (OpenAI, Cohere, a local model).
/// Failures map to [`CacheError::EmbeddingUnavailable`]; the cache degrades
/// to exact-only matching for the rest of that call.
///
/// [`CacheError::EmbeddingUnavailable`]: crate::domain::error::CacheError::EmbeddingUnavailable
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    /// Embeds `text` into a dense vector.
    async fn embed(&self, text: &str) -> DomainResult<Vec<f32>>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimensions(&self) -> usize;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::error::CacheError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock embedder with deterministic hash-based vectors and optional
    /// pinned vectors for exercising similarity thresholds.
    #[derive(Debug)]
    pub struct MockEmbedder {
        dimensions: usize,
        pinned: Mutex<HashMap<String, Vec<f32>>>,
        error: Option<String>,
    }

    impl MockEmbedder {
        pub fn new(dimensions: usize) -> Self {
            Self {
                dimensions,
                pinned: Mutex::new(HashMap::new()),
                error: None,
            }
        }

        /// Returns `vector` for exactly `text` instead of the derived one.
        pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
            self.pinned.lock().unwrap().insert(text.into(), vector);
            self
        }

        /// Every call fails, as if the embedding model were unreachable.
        pub fn with_error(mut self, error: impl Into<String>) -> Self {
            self.error = Some(error.into());
            self
        }
    }

    #[async_trait]
    impl Embedder for MockEmbedder {
        async fn embed(&self, text: &str) -> DomainResult<Vec<f32>> {
            if let Some(ref error) = self.error {
                return Err(CacheError::embedding(error.clone()));
            }

            if let Some(vector) = self.pinned.lock().unwrap().get(text) {
                return Ok(vector.clone());
            }

            // Deterministic pseudo-embedding: xorshift stream seeded by an
            // FNV-1a hash of the text, so unrelated texts land far apart
            let mut state = text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
                (acc ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
            }) | 1;

            let vector: Vec<f32> = (0..self.dimensions)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    ((state % 2001) as f32 / 1000.0) - 1.0
                })
                .collect();

            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_deterministic_vectors() {
            let embedder = MockEmbedder::new(16);
            let a = embedder.embed("hello").await.unwrap();
            let b = embedder.embed("hello").await.unwrap();

            assert_eq!(a, b);
            assert_eq!(a.len(), 16);
        }

        #[tokio::test]
        async fn test_pinned_vector_wins() {
            let embedder = MockEmbedder::new(16).with_vector("hello", vec![1.0, 0.0]);
            assert_eq!(embedder.embed("hello").await.unwrap(), vec![1.0, 0.0]);
        }

        #[tokio::test]
        async fn test_error_mode() {
            let embedder = MockEmbedder::new(16).with_error("model offline");
            let result = embedder.embed("hello").await;
            assert!(matches!(
                result,
                Err(CacheError::EmbeddingUnavailable { .. })
            ));
        }
    }
}
