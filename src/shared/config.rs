use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Sqlite,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "file" => Some(StorageBackend::File),
            "sqlite" => Some(StorageBackend::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// File backend root. Empty means the platform data directory.
    pub data_dir: String,
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub replay_on_start: bool,
    /// Replay attempts allowed for a record the server keeps failing with 5xx.
    pub max_retry: u32,
    pub max_batch_size: usize,
    /// Sync events a view may fall behind by before it starts missing them.
    pub event_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::File,
                data_dir: String::new(),
                database_url: "sqlite:data/fieldsync.db?mode=rwc".to_string(),
                max_connections: 1,
            },
            sync: SyncConfig {
                replay_on_start: true,
                max_retry: 3,
                max_batch_size: 20,
                event_buffer: 64,
            },
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(backend) = lookup("FIELDSYNC_STORAGE_BACKEND")
            .as_deref()
            .and_then(StorageBackend::parse)
        {
            cfg.storage.backend = backend;
        }
        if let Some(v) = lookup("FIELDSYNC_DATA_DIR") {
            cfg.storage.data_dir = v.trim().to_string();
        }
        if let Some(v) = lookup("FIELDSYNC_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.storage.database_url = v.trim().to_string();
            }
        }
        if let Some(value) = lookup("FIELDSYNC_MAX_RETRY").as_deref().and_then(parse_u32) {
            cfg.sync.max_retry = value;
        }
        if let Some(value) = lookup("FIELDSYNC_MAX_BATCH_SIZE")
            .as_deref()
            .and_then(parse_u32)
        {
            cfg.sync.max_batch_size = value as usize;
        }
        if let Some(value) = lookup("FIELDSYNC_EVENT_BUFFER")
            .as_deref()
            .and_then(parse_u32)
        {
            cfg.sync.event_buffer = value as usize;
        }
        if let Some(v) = lookup("FIELDSYNC_REPLAY_ON_START") {
            cfg.sync.replay_on_start = parse_bool(&v, cfg.sync.replay_on_start);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage.backend == StorageBackend::Sqlite {
            if self.storage.max_connections == 0 {
                return Err("Storage max_connections must be greater than 0".to_string());
            }
            if self.storage.database_url.is_empty() {
                return Err("Storage database_url must be set for the sqlite backend".to_string());
            }
        }
        if self.sync.max_batch_size == 0 {
            return Err("Sync max_batch_size must be greater than 0".to_string());
        }
        if self.sync.event_buffer == 0 {
            return Err("Sync event_buffer must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u32(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok()
}
