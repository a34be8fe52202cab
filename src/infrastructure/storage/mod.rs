pub mod file_store;
pub mod memory_store;
pub mod sqlite_store;

pub use file_store::FileKeyValueStore;
pub use memory_store::MemoryKeyValueStore;
pub use sqlite_store::SqliteKeyValueStore;
