//! Semantic index domain - embedding-based near-duplicate lookup

mod index;

pub use index::{IndexEntry, SemanticIndex, SemanticMatch};
