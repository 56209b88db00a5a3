//! Persona Cache
//!
//! Multi-layer response cache for LLM persona generation. Avoids redundant,
//! costly LLM calls by matching identical requests exactly and near-duplicate
//! requests through embedding similarity:
//! - three logical layers (parsed input → rendered prompt → response)
//! - pluggable storage backends (memory, sharded files, embedded sqlite)
//! - exact matching with TTLs, plus a semantic fallback in the response layer
//! - LRU eviction under per-layer byte caps, hit/miss/bytes-saved accounting
//!
//! Cache failures are never fatal to generation; they only cost extra calls,
//! visible through stats and logs.

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{
    BackendKind, CacheSettings, LayerSettings, LogFormat, LoggingSettings, SemanticSettings,
};
pub use domain::CacheError;
pub use domain::cache::{Backend, CacheKey, CacheLayer, EntryMetadata, KeyGenerator};
pub use domain::embedding::{Embedder, cosine_similarity};
pub use domain::generation::{
    CacheMatchInfo, GeneratedResponse, GenerationError, GenerationRequest, Generator, MatchType,
    ProviderContext,
};
pub use domain::semantic::{IndexEntry, SemanticIndex, SemanticMatch};
pub use infrastructure::backend::{BackendFactory, FileBackend, MemoryBackend, SqliteBackend};
pub use infrastructure::eviction::LruEvictionPolicy;
pub use infrastructure::logging::init_logging;
pub use infrastructure::semantic::InMemorySemanticIndex;
pub use infrastructure::services::{CacheManager, ExactCache, LayerBackends};
pub use infrastructure::stats::{CacheStats, LayerStats, StatsCollector};
