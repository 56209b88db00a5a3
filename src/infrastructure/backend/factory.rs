//! Backend factory for construction-time selection

use std::sync::Arc;

use crate::config::{BackendKind, BackendSettings};
use crate::domain::DomainResult;
use crate::domain::cache::{Backend, CacheLayer};
use crate::domain::error::CacheError;

use super::file::FileBackend;
use super::in_memory::MemoryBackend;
use super::sqlite::SqliteBackend;

/// Creates one backend instance per cache layer from configuration.
///
/// Selection happens once, at construction; callers only ever see
/// `Arc<dyn Backend>`.
#[derive(Debug, Default)]
pub struct BackendFactory;

impl BackendFactory {
    pub fn new() -> Self {
        Self
    }

    /// Builds the backend for `layer`. File and sqlite stores are namespaced
    /// per layer under the configured base path so layers never share keys.
    pub async fn create(
        &self,
        settings: &BackendSettings,
        layer: CacheLayer,
    ) -> DomainResult<Arc<dyn Backend>> {
        match settings.kind {
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
            BackendKind::File => {
                let base = settings.path.as_ref().ok_or_else(|| {
                    CacheError::configuration("backend.path is required for the file backend")
                })?;
                let backend = FileBackend::new(base.join(layer.tag())).await?;
                Ok(Arc::new(backend))
            }
            BackendKind::Sqlite => {
                let base = settings.path.as_ref().ok_or_else(|| {
                    CacheError::configuration("backend.path is required for the sqlite backend")
                })?;
                let backend = SqliteBackend::open(base.join(format!("{}.db", layer.tag()))).await?;
                Ok(Arc::new(backend))
            }
        }
    }
}
