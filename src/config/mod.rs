//! Configuration layer

mod settings;

pub use settings::{BackendKind, BackendSettings, CacheSettings, LayerSettings, SemanticSettings};

use serde::Deserialize;

/// Logging configuration for the host process.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}
