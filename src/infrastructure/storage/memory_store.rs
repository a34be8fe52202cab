use crate::application::ports::key_value_store::KeyValueStore;
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store. Contents survive as long as the instance does, which
/// is what tests use to simulate an app restart over the same storage.
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn namespaces(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, namespace: &str) -> Result<Option<Value>, AppError> {
        Ok(self.entries.read().await.get(namespace).cloned())
    }

    async fn set(&self, namespace: &str, value: Value) -> Result<(), AppError> {
        self.entries
            .write()
            .await
            .insert(namespace.to_string(), value);
        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<(), AppError> {
        self.entries.write().await.remove(namespace);
        Ok(())
    }
}
