use crate::application::ports::key_value_store::KeyValueStore;
use crate::shared::error::AppError;
use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

const FILE_EXTENSION: &str = "json";

/// One JSON file per namespace under a root directory. Writes land in a
/// temporary file first and are renamed over the target.
pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create store directory {}", root.display()))?;
        Ok(Self { root })
    }

    /// `<platform data dir>/fieldsync`, falling back to the working directory.
    pub fn default_root() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fieldsync")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, namespace: &str) -> PathBuf {
        self.root
            .join(format!("{}.{FILE_EXTENSION}", encode_namespace(namespace)))
    }
}

/// Maps a namespace onto a portable file name. Anything outside
/// `[A-Za-z0-9_-]` becomes `~XX`.
fn encode_namespace(namespace: &str) -> String {
    let mut encoded = String::with_capacity(namespace.len());
    for byte in namespace.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "~{byte:02X}");
        }
    }
    encoded
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, namespace: &str) -> Result<Option<Value>, AppError> {
        let path = self.path_for(namespace);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed to read {}", path.display()))
                    .into());
            }
        };
        let value: Value = serde_json::from_slice(&raw)
            .with_context(|| format!("corrupt store file {}", path.display()))?;
        Ok(Some(value))
    }

    async fn set(&self, namespace: &str, value: Value) -> Result<(), AppError> {
        let path = self.path_for(namespace);
        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", encode_namespace(namespace), Uuid::new_v4()));
        let raw = serde_json::to_vec(&value)
            .map_err(|err| AppError::SerializationError(err.to_string()))?;

        fs::write(&tmp, raw)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(err) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(anyhow::Error::new(err)
                .context(format!("failed to replace {}", path.display()))
                .into());
        }
        Ok(())
    }

    async fn remove(&self, namespace: &str) -> Result<(), AppError> {
        let path = self.path_for(namespace);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("failed to remove {}", path.display()))
                .into()),
        }
    }
}
