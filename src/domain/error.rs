use thiserror::Error;

use crate::domain::generation::GenerationError;

/// Core cache subsystem errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storage backend could not serve the operation. Recovered locally by
    /// the layer that hit it: the lookup becomes a miss, the write is dropped.
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// A stored entry could not be deserialized. The entry is deleted and the
    /// read treated as a miss.
    #[error("Corrupted entry: {message}")]
    CorruptedEntry { message: String },

    /// The embedding model could not be reached. Semantic matching is skipped
    /// for the remainder of the call; exact matching continues.
    #[error("Embedding unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    /// The caller handed the keyer a payload that cannot be canonicalized.
    /// This is a contract violation upstream and surfaces as a hard failure.
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Invalid cache configuration. Fatal at construction time.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Error from the downstream generator. Not a cache error; passed through
    /// unchanged to the caller.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::CorruptedEntry {
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for the failure modes a lookup path absorbs as a miss.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Backend { .. } | Self::CorruptedEntry { .. } | Self::EmbeddingUnavailable { .. }
        )
    }
}
