//! Generation domain - the persona pipeline as seen by the cache
//!
//! The cache orchestrates three stages of a generation request: parsing the
//! raw research input, rendering the prompt, and the LLM call itself. All
//! three are supplied by the caller through the [`Generator`] trait; their
//! errors are not cache errors and pass through unchanged.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error from the caller-provided pipeline (parse, render, or the LLM call).
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GenerationError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GenerationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Provider and model identity a response is generated against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderContext {
    pub provider: String,
    pub model: String,
}

impl ProviderContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl fmt::Display for ProviderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// One persona-generation request entering the cache.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Raw research input text
    pub raw_input: String,
    /// Prompt template identity and body
    pub prompt_template: String,
    /// Which provider/model will serve the request
    pub provider: ProviderContext,
    /// Skip response lookups and force regeneration; results are still
    /// written back afterward.
    pub bypass_cache: bool,
}

impl GenerationRequest {
    pub fn new(
        raw_input: impl Into<String>,
        prompt_template: impl Into<String>,
        provider: ProviderContext,
    ) -> Self {
        Self {
            raw_input: raw_input.into(),
            prompt_template: prompt_template.into(),
            provider,
            bypass_cache: false,
        }
    }

    pub fn with_bypass(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

/// Output of the downstream LLM call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedResponse {
    /// Generated persona content
    pub content: String,
}

impl GeneratedResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// How a `get_or_generate` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Response served from the exact-match layer
    Exact,
    /// Response served via embedding similarity
    Semantic,
    /// Full miss; the generator ran
    None,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => write!(f, "exact"),
            MatchType::Semantic => write!(f, "semantic"),
            MatchType::None => write!(f, "none"),
        }
    }
}

/// Cache outcome attached to every generation result.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMatchInfo {
    pub match_type: MatchType,
    /// Similarity score for semantic matches
    pub similarity: Option<f32>,
    /// Parsed input was reused from the input layer
    pub input_reused: bool,
    /// Rendered prompt was reused from the prompt layer
    pub prompt_reused: bool,
}

/// Caller-provided pipeline around the cache: input parsing, prompt
/// rendering, and the actual LLM call.
///
/// Parsing and rendering are deterministic and cheap relative to generation,
/// but still worth caching across a batch. `generate` is a slow network call
/// and is never invoked while any cache lock is held.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Parses raw research input into its structured form.
    async fn parse_input(&self, raw_input: &str) -> Result<Value, GenerationError>;

    /// Renders the prompt for a parsed input.
    async fn render_prompt(
        &self,
        template: &str,
        parsed_input: &Value,
    ) -> Result<String, GenerationError>;

    /// The actual LLM call.
    async fn generate(&self, prompt: &str) -> Result<GeneratedResponse, GenerationError>;
}
