//! Cache entry metadata and layer identity

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// The three logical caching stages of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayer {
    /// Parsed research input
    Input,
    /// Rendered prompt text
    Prompt,
    /// Generated LLM response
    Response,
}

impl CacheLayer {
    pub const ALL: [CacheLayer; 3] = [CacheLayer::Input, CacheLayer::Prompt, CacheLayer::Response];

    /// Stable identifier used in hash inputs and storage namespaces.
    pub fn tag(self) -> &'static str {
        match self {
            CacheLayer::Input => "input",
            CacheLayer::Prompt => "prompt",
            CacheLayer::Response => "response",
        }
    }
}

impl fmt::Display for CacheLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Metadata stored alongside an entry's value.
///
/// Entries are immutable once written; only `last_accessed` moves, updated on
/// every successful `get` (never on `put`) so eviction can order entries by
/// recency of use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Creation time, millis since epoch
    pub created_at: u64,
    /// Expiry time, millis since epoch
    pub expires_at: u64,
    /// Last successful read, millis since epoch
    pub last_accessed: u64,
    /// Size of the stored value in bytes
    pub size_bytes: u64,
}

impl EntryMetadata {
    pub fn new(size_bytes: u64, ttl: Duration) -> Self {
        let now = unix_millis();
        Self {
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            last_accessed: now,
            size_bytes,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_millis())
    }

    pub fn is_expired_at(&self, now_millis: u64) -> bool {
        now_millis >= self.expires_at
    }

    /// Copy with the access time bumped to now.
    pub fn touched(&self) -> Self {
        Self {
            last_accessed: unix_millis(),
            ..self.clone()
        }
    }
}

/// Current wall-clock time in millis since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
