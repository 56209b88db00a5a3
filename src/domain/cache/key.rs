//! Cache key derivation

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::DomainResult;
use crate::domain::cache::CacheLayer;
use crate::domain::error::CacheError;
use crate::domain::generation::ProviderContext;

/// Opaque 256-bit cache key derived from canonicalized request content.
///
/// Logically identical requests always hash to the same key; the layer tag is
/// part of the hash input, so keys from different layers never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Key length in bytes
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex form, used as the storage identifier by all backends.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a key back from its hex form (e.g. a backend scan result).
    pub fn from_hex(s: &str) -> DomainResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| CacheError::corrupted(format!("invalid key encoding: {}", e)))?;
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| CacheError::corrupted(format!("key must be {} bytes", Self::LEN)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}

/// Derives per-layer cache keys from canonicalized request content.
///
/// Pure and side-effect free. The only failure mode is a payload that cannot
/// be represented as JSON (e.g. a map with non-string keys), which is a
/// contract violation by the caller and reported as
/// [`CacheError::InvalidPayload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Canonical JSON for a serializable payload: object keys sorted,
    /// no insignificant whitespace.
    pub fn canonicalize<T: Serialize>(payload: &T) -> DomainResult<String> {
        let value = serde_json::to_value(payload)
            .map_err(|e| CacheError::invalid_payload(format!("payload is not JSON: {}", e)))?;

        let mut out = String::new();
        write_canonical(&value, &mut out)
            .map_err(|e| CacheError::invalid_payload(format!("payload is not JSON: {}", e)))?;

        Ok(out)
    }

    /// Key for the input layer, from the raw research input.
    pub fn input_key(&self, raw_input: &str) -> CacheKey {
        digest(CacheLayer::Input, &[raw_input.trim()])
    }

    /// Key for the prompt layer, from the template and the parsed input.
    pub fn prompt_key(&self, template: &str, parsed_input: &Value) -> DomainResult<CacheKey> {
        let canonical = Self::canonicalize(parsed_input)?;
        Ok(digest(CacheLayer::Prompt, &[template.trim(), &canonical]))
    }

    /// Key for the response layer. Provider and model identity are part of
    /// the hash input: the same prompt against different models must not
    /// collide.
    pub fn response_key(&self, rendered_prompt: &str, provider: &ProviderContext) -> CacheKey {
        digest(
            CacheLayer::Response,
            &[rendered_prompt.trim(), &provider.provider, &provider.model],
        )
    }
}

/// Parts are length-prefixed so adjacent parts cannot collide by
/// concatenation.
fn digest(layer: CacheLayer, parts: &[&str]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(layer.tag().as_bytes());

    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }

    CacheKey(hasher.finalize().into())
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
    }

    Ok(())
}
