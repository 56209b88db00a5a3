//! Storage backend implementations

mod factory;
mod file;
mod in_memory;
mod sqlite;

pub use factory::BackendFactory;
pub use file::FileBackend;
pub use in_memory::MemoryBackend;
pub use sqlite::SqliteBackend;
