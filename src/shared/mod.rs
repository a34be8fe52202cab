pub mod config;
pub mod error;
pub mod keyed_lock;

pub use config::{AppConfig, StorageBackend};
pub use error::{AppError, Result};
pub use keyed_lock::KeyedLocks;
