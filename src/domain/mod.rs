//! Domain layer - traits, value types and errors; no I/O

pub mod cache;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod semantic;

pub use error::CacheError;

/// Shorthand for results carrying a [`CacheError`].
pub type DomainResult<T> = Result<T, CacheError>;
