//! Cache settings - layered loading and validation

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DomainResult;
use crate::domain::error::CacheError;

/// Immutable cache configuration, loaded once at manager construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Master switch for the whole subsystem
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Storage backend selection
    #[serde(default)]
    pub backend: BackendSettings,

    /// Input-parsing layer
    #[serde(default)]
    pub input: LayerSettings,

    /// Prompt-rendering layer
    #[serde(default)]
    pub prompt: LayerSettings,

    /// Response layer
    #[serde(default = "LayerSettings::response_default")]
    pub response: LayerSettings,

    /// Embedding-similarity matching within the response layer
    #[serde(default)]
    pub semantic: SemanticSettings,

    /// Budget for a single backend or index call; operations that exceed it
    /// are treated as a miss.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

/// Per-layer knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live in seconds
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Byte cap enforced by LRU eviction
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
}

/// Semantic matching knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum cosine similarity for a semantic hit, in [0, 1]
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base directory for the file and sqlite backends
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Supported backend kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-lifetime in-memory store
    #[default]
    Memory,
    /// Content-addressed file per key, directory-sharded
    File,
    /// Embedded single-file sqlite store
    Sqlite,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Ok(BackendKind::Memory),
            "file" | "fs" => Ok(BackendKind::File),
            "sqlite" => Ok(BackendKind::Sqlite),
            _ => Err(CacheError::configuration(format!(
                "Unknown backend kind: {}. Valid kinds: memory, file, sqlite",
                s
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_size_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_similarity_threshold() -> f32 {
    0.95
}

fn default_operation_timeout_ms() -> u64 {
    2_000
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_seconds: default_ttl_seconds(),
            max_size_bytes: default_max_size_bytes(),
        }
    }
}

impl LayerSettings {
    /// Responses are the expensive artifact; default to a larger cap.
    fn response_default() -> Self {
        Self {
            max_size_bytes: 256 * 1024 * 1024,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_seconds = ttl.as_secs();
        self
    }

    pub fn with_max_size_bytes(mut self, max: u64) -> Self {
        self.max_size_bytes = max;
        self
    }
}

impl Default for SemanticSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            threshold: default_similarity_threshold(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            backend: BackendSettings::default(),
            input: LayerSettings::default(),
            prompt: LayerSettings::default(),
            response: LayerSettings::response_default(),
            semantic: SemanticSettings::default(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl CacheSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from `config/default` + `config/local` files and
    /// `PERSONA_CACHE__`-prefixed environment variables, then validates.
    pub fn load() -> DomainResult<Self> {
        let settings: Self = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("PERSONA_CACHE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| CacheError::configuration(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Rejects configurations the manager must not start with.
    pub fn validate(&self) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&self.semantic.threshold) {
            return Err(CacheError::configuration(format!(
                "semantic.threshold must be within [0.0, 1.0], got {}",
                self.semantic.threshold
            )));
        }

        for (name, layer) in [
            ("input", &self.input),
            ("prompt", &self.prompt),
            ("response", &self.response),
        ] {
            if layer.ttl_seconds == 0 {
                return Err(CacheError::configuration(format!(
                    "{}.ttl_seconds must be positive",
                    name
                )));
            }
            if layer.max_size_bytes == 0 {
                return Err(CacheError::configuration(format!(
                    "{}.max_size_bytes must be positive",
                    name
                )));
            }
        }

        if self.operation_timeout_ms == 0 {
            return Err(CacheError::configuration(
                "operation_timeout_ms must be positive",
            ));
        }

        if matches!(self.backend.kind, BackendKind::File | BackendKind::Sqlite)
            && self.backend.path.is_none()
        {
            return Err(CacheError::configuration(format!(
                "backend.path is required for the {} backend",
                self.backend.kind
            )));
        }

        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_backend(mut self, kind: BackendKind, path: Option<PathBuf>) -> Self {
        self.backend = BackendSettings { kind, path };
        self
    }

    pub fn with_input(mut self, layer: LayerSettings) -> Self {
        self.input = layer;
        self
    }

    pub fn with_prompt(mut self, layer: LayerSettings) -> Self {
        self.prompt = layer;
        self
    }

    pub fn with_response(mut self, layer: LayerSettings) -> Self {
        self.response = layer;
        self
    }

    pub fn with_semantic_enabled(mut self, enabled: bool) -> Self {
        self.semantic.enabled = enabled;
        self
    }

    pub fn with_semantic_threshold(mut self, threshold: f32) -> Self {
        self.semantic.threshold = threshold;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
