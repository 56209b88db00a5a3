//! Cache orchestration across the input, prompt and response layers

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::domain::DomainResult;
use crate::domain::cache::{Backend, CacheKey, CacheLayer, KeyGenerator, unix_millis};
use crate::domain::embedding::Embedder;
use crate::domain::generation::{
    CacheMatchInfo, GeneratedResponse, GenerationRequest, Generator, MatchType,
};
use crate::domain::semantic::{IndexEntry, SemanticIndex};
use crate::infrastructure::backend::BackendFactory;
use crate::infrastructure::eviction::LruEvictionPolicy;
use crate::infrastructure::semantic::InMemorySemanticIndex;
use crate::infrastructure::services::ExactCache;
use crate::infrastructure::stats::{CacheStats, StatsCollector};

/// One backend per logical layer.
#[derive(Debug)]
pub struct LayerBackends {
    pub input: Arc<dyn Backend>,
    pub prompt: Arc<dyn Backend>,
    pub response: Arc<dyn Backend>,
}

#[derive(Debug)]
struct Layer {
    cache: ExactCache,
    eviction: LruEvictionPolicy,
    enabled: bool,
}

/// Orchestrates the three caching layers and the exact/semantic fallback
/// within the response layer. The only entry point other subsystems call.
///
/// Constructed explicitly with its configuration; there is no global
/// instance, so tests build isolated managers freely. Construction fails
/// fast on invalid settings.
#[derive(Debug)]
pub struct CacheManager {
    settings: CacheSettings,
    keys: KeyGenerator,
    input: Layer,
    prompt: Layer,
    response: Layer,
    index: Arc<dyn SemanticIndex>,
    embedder: Arc<dyn Embedder>,
    stats: StatsCollector,
}

impl CacheManager {
    pub fn new(
        settings: CacheSettings,
        backends: LayerBackends,
        index: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> DomainResult<Self> {
        settings.validate()?;

        let op_timeout = settings.operation_timeout();
        let build = |layer, backend, cfg: &crate::config::LayerSettings| Layer {
            cache: ExactCache::new(layer, backend, cfg.ttl(), op_timeout),
            eviction: LruEvictionPolicy::new(cfg.max_size_bytes),
            enabled: settings.enabled && cfg.enabled,
        };

        Ok(Self {
            input: build(CacheLayer::Input, backends.input, &settings.input),
            prompt: build(CacheLayer::Prompt, backends.prompt, &settings.prompt),
            response: build(CacheLayer::Response, backends.response, &settings.response),
            keys: KeyGenerator::new(),
            index,
            embedder,
            stats: StatsCollector::new(),
            settings,
        })
    }

    /// Builds a manager with factory-selected backends and the in-memory
    /// semantic index.
    pub async fn from_settings(
        settings: CacheSettings,
        embedder: Arc<dyn Embedder>,
    ) -> DomainResult<Self> {
        settings.validate()?;

        let factory = BackendFactory::new();
        let backends = LayerBackends {
            input: factory.create(&settings.backend, CacheLayer::Input).await?,
            prompt: factory.create(&settings.backend, CacheLayer::Prompt).await?,
            response: factory
                .create(&settings.backend, CacheLayer::Response)
                .await?,
        };

        Self::new(
            settings,
            backends,
            Arc::new(InMemorySemanticIndex::new()),
            embedder,
        )
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Serves a generation request through the cache.
    ///
    /// Probes input → prompt → response (exact, then semantic); on a full
    /// miss runs the generator and writes every produced artifact back.
    /// Generator errors propagate unchanged; cache failures never do.
    pub async fn get_or_generate(
        &self,
        request: &GenerationRequest,
        generator: &dyn Generator,
    ) -> DomainResult<(GeneratedResponse, CacheMatchInfo)> {
        let input_key = self.keys.input_key(&request.raw_input);
        let (parsed, input_reused) = self.resolve_input(&input_key, request, generator).await?;

        let prompt_key = self.keys.prompt_key(&request.prompt_template, &parsed)?;
        let (rendered, prompt_reused) = self
            .resolve_prompt(&prompt_key, request, &parsed, generator)
            .await?;

        let response_key = self.keys.response_key(&rendered, &request.provider);

        // Lookup phase. Bypass skips it but still writes results back below.
        let mut prompt_embedding: Option<Vec<f32>> = None;
        let mut embedding_degraded = false;

        if self.response.enabled && !request.bypass_cache {
            if let Some((response, size)) = self
                .response
                .cache
                .lookup_typed::<GeneratedResponse>(&response_key)
                .await
            {
                self.stats.record_exact_hit(CacheLayer::Response, size);
                debug!(key = %response_key, "exact response hit");

                return Ok((
                    response,
                    CacheMatchInfo {
                        match_type: MatchType::Exact,
                        similarity: None,
                        input_reused,
                        prompt_reused,
                    },
                ));
            }

            if self.settings.semantic.enabled {
                match self.embedder.embed(&rendered).await {
                    Ok(embedding) => {
                        if let Some((response, size, similarity)) =
                            self.semantic_lookup(&embedding).await
                        {
                            self.stats.record_semantic_hit(size);
                            debug!(similarity, "semantic response hit");

                            return Ok((
                                response,
                                CacheMatchInfo {
                                    match_type: MatchType::Semantic,
                                    similarity: Some(similarity),
                                    input_reused,
                                    prompt_reused,
                                },
                            ));
                        }

                        prompt_embedding = Some(embedding);
                    }
                    Err(e) => {
                        warn!(error = %e, "embedding unavailable, continuing exact-only");
                        embedding_degraded = true;
                    }
                }
            }
        }

        if self.response.enabled {
            self.stats.record_miss(CacheLayer::Response);
        }

        let response = generator.generate(&rendered).await?;

        if self.response.enabled {
            self.store_response(
                &response_key,
                &response,
                &rendered,
                prompt_embedding,
                embedding_degraded,
            )
            .await;
        }

        Ok((
            response,
            CacheMatchInfo {
                match_type: MatchType::None,
                similarity: None,
                input_reused,
                prompt_reused,
            },
        ))
    }

    async fn resolve_input(
        &self,
        key: &CacheKey,
        request: &GenerationRequest,
        generator: &dyn Generator,
    ) -> DomainResult<(Value, bool)> {
        if self.input.enabled {
            if let Some((parsed, size)) = self.input.cache.lookup_typed::<Value>(key).await {
                self.stats.record_exact_hit(CacheLayer::Input, size);
                return Ok((parsed, true));
            }
            self.stats.record_miss(CacheLayer::Input);
        }

        let parsed = generator.parse_input(&request.raw_input).await?;

        if self.input.enabled && self.input.cache.store_typed(key, &parsed).await {
            self.enforce_cap(&self.input).await;
        }

        Ok((parsed, false))
    }

    async fn resolve_prompt(
        &self,
        key: &CacheKey,
        request: &GenerationRequest,
        parsed: &Value,
        generator: &dyn Generator,
    ) -> DomainResult<(String, bool)> {
        if self.prompt.enabled {
            if let Some((rendered, size)) = self.prompt.cache.lookup_typed::<String>(key).await {
                self.stats.record_exact_hit(CacheLayer::Prompt, size);
                return Ok((rendered, true));
            }
            self.stats.record_miss(CacheLayer::Prompt);
        }

        let rendered = generator
            .render_prompt(&request.prompt_template, parsed)
            .await?;

        if self.prompt.enabled && self.prompt.cache.store_typed(key, &rendered).await {
            self.enforce_cap(&self.prompt).await;
        }

        Ok((rendered, false))
    }

    /// Index search plus backend validation: the indexed key may have been
    /// evicted or expired independently, in which case the dangling entry is
    /// removed and the search degrades to a miss.
    async fn semantic_lookup(&self, embedding: &[f32]) -> Option<(GeneratedResponse, u64, f32)> {
        let threshold = self.settings.semantic.threshold;

        let found = match timeout(
            self.settings.operation_timeout(),
            self.index.search(embedding, threshold),
        )
        .await
        {
            Ok(Ok(found)) => found?,
            Ok(Err(e)) => {
                warn!(error = %e, "semantic search failed, treating as miss");
                return None;
            }
            Err(_) => {
                warn!("semantic search timed out");
                return None;
            }
        };

        match self
            .response
            .cache
            .lookup_typed::<GeneratedResponse>(&found.key)
            .await
        {
            Some((response, size)) => Some((response, size, found.similarity)),
            None => {
                debug!(key = %found.key, "dropping dangling semantic index entry");
                let _ = self.index.remove(&found.key).await;
                None
            }
        }
    }

    /// Best-effort write-back after generation. Failures are logged and
    /// discarded; the generation result is already in hand.
    async fn store_response(
        &self,
        key: &CacheKey,
        response: &GeneratedResponse,
        rendered_prompt: &str,
        prompt_embedding: Option<Vec<f32>>,
        embedding_degraded: bool,
    ) {
        if self.response.cache.store_typed(key, response).await {
            self.enforce_cap(&self.response).await;
        }

        if !self.settings.semantic.enabled || embedding_degraded {
            return;
        }

        // Bypassed lookups never embedded; do it now, still best-effort
        let embedding = match prompt_embedding {
            Some(embedding) => embedding,
            None => match self.embedder.embed(rendered_prompt).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(error = %e, "skipping semantic indexing for this response");
                    return;
                }
            },
        };

        let entry = IndexEntry::new(*key, embedding, source_hash(rendered_prompt));
        match timeout(self.settings.operation_timeout(), self.index.insert(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "discarding failed index insert"),
            Err(_) => warn!("index insert timed out"),
        }
    }

    /// Runs eviction for a layer; response-layer evictions also drop the
    /// matching semantic index entries.
    async fn enforce_cap(&self, layer: &Layer) {
        let evicted = match layer.eviction.enforce(layer.cache.backend().as_ref()).await {
            Ok(evicted) => evicted,
            Err(e) => {
                warn!(layer = %layer.cache.layer(), error = %e, "eviction pass failed");
                return;
            }
        };

        if layer.cache.layer() == CacheLayer::Response {
            for key in &evicted {
                if let Err(e) = self.index.remove(key).await {
                    warn!(key = %key, error = %e, "failed to drop evicted index entry");
                }
            }
        }
    }

    fn layer(&self, layer: CacheLayer) -> &Layer {
        match layer {
            CacheLayer::Input => &self.input,
            CacheLayer::Prompt => &self.prompt,
            CacheLayer::Response => &self.response,
        }
    }

    /// Point-in-time counters for the reporting surface.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Operator action; the only way counters go backward.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Purges entries, optionally restricted to one layer and to entries
    /// older than the given age. Returns how many entries were removed.
    pub async fn clear(
        &self,
        layer: Option<CacheLayer>,
        older_than: Option<std::time::Duration>,
    ) -> DomainResult<usize> {
        let layers: Vec<CacheLayer> = match layer {
            Some(layer) => vec![layer],
            None => CacheLayer::ALL.to_vec(),
        };

        let mut removed = 0;

        for target in layers {
            let backend = self.layer(target).cache.backend();

            match older_than {
                None => {
                    removed += backend.scan("").await?.len();
                    backend.clear().await?;

                    if target == CacheLayer::Response {
                        self.index.clear().await?;
                    }
                }
                Some(age) => {
                    let cutoff = unix_millis().saturating_sub(age.as_millis() as u64);

                    for key in backend.scan("").await? {
                        let Some(meta) = backend.stat(&key).await? else {
                            continue;
                        };

                        if meta.created_at <= cutoff && backend.delete(&key).await? {
                            removed += 1;

                            if target == CacheLayer::Response {
                                let _ = self.index.remove(&key).await;
                            }
                        }
                    }
                }
            }
        }

        Ok(removed)
    }

    /// Proactive TTL sweep across every layer.
    pub async fn purge_expired(&self) -> DomainResult<usize> {
        let mut purged = 0;

        for layer in CacheLayer::ALL {
            purged += self.layer(layer).cache.backend().purge_expired().await?;
        }

        Ok(purged)
    }

    /// Tears the manager down. Backends close when their last reference
    /// drops; this exists so owners shut the cache down explicitly instead
    /// of leaking it into process exit.
    pub async fn close(self) {
        debug!("cache manager closed");
    }
}

/// First 8 bytes of the content hash, for duplicate suppression in the index.
fn source_hash(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    u64::from_le_bytes(digest[..8].try_into().unwrap_or_default())
}
