use crate::shared::error::AppError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Durable whole-blob storage keyed by namespace. Every read and write
/// round-trips the entire value; there are no transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, namespace: &str) -> Result<Option<Value>, AppError>;
    async fn set(&self, namespace: &str, value: Value) -> Result<(), AppError>;
    async fn remove(&self, namespace: &str) -> Result<(), AppError>;
}

pub async fn load_json<T>(store: &dyn KeyValueStore, namespace: &str) -> Result<Option<T>, AppError>
where
    T: DeserializeOwned,
{
    let Some(raw) = store.get(namespace).await? else {
        return Ok(None);
    };
    serde_json::from_value(raw)
        .map(Some)
        .map_err(|err| AppError::DeserializationError(format!("{namespace}: {err}")))
}

pub async fn save_json<T>(store: &dyn KeyValueStore, namespace: &str, value: &T) -> Result<(), AppError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_value(value)
        .map_err(|err| AppError::SerializationError(format!("{namespace}: {err}")))?;
    store.set(namespace, json).await
}
