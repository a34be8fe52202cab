use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned on the device when a point is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPointId(String);

impl LocalPointId {
    pub fn new(value: String) -> Result<Self, String> {
        if value.trim().is_empty() {
            return Err("Local point ID cannot be empty".to_string());
        }
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        Self(format!("local-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the server assigns once it durably accepted a point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerPointId(String);

impl ServerPointId {
    pub fn new(value: String) -> Result<Self, String> {
        if value.trim().is_empty() {
            return Err("Server point ID cannot be empty".to_string());
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sync state of an annotation point: exactly one of the two identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum PointIdentity {
    Pending(LocalPointId),
    Synced(ServerPointId),
}

impl PointIdentity {
    pub fn is_local_only(&self) -> bool {
        matches!(self, PointIdentity::Pending(_))
    }

    pub fn local_id(&self) -> Option<&LocalPointId> {
        match self {
            PointIdentity::Pending(id) => Some(id),
            PointIdentity::Synced(_) => None,
        }
    }

    pub fn server_id(&self) -> Option<&ServerPointId> {
        match self {
            PointIdentity::Pending(_) => None,
            PointIdentity::Synced(id) => Some(id),
        }
    }
}

impl fmt::Display for PointIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointIdentity::Pending(id) => write!(f, "pending:{id}"),
            PointIdentity::Synced(id) => write!(f, "synced:{id}"),
        }
    }
}
