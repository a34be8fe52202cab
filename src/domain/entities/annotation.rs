use crate::domain::value_objects::{LocalPointId, PointIdentity, ServerPointId, UploadKey};
use serde::{Deserialize, Serialize};

/// Inspector verdict on a point or a whole checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    Accepted,
    Rejected,
    #[default]
    Pending,
}

/// A photo or document captured on site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub upload_key: UploadKey,
    pub file_name: String,
    pub local_path: String,
    pub content_type: Option<String>,
}

impl AttachedFile {
    pub fn new(file_name: impl Into<String>, local_path: impl Into<String>) -> Self {
        Self {
            upload_key: UploadKey::generate(),
            file_name: file_name.into(),
            local_path: local_path.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Position on the floor diagram, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PointGeometry {
    pub x: f64,
    pub y: f64,
}

impl PointGeometry {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One inspection mark on a floor diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationPoint {
    pub identity: PointIdentity,
    pub geometry: PointGeometry,
    #[serde(default)]
    pub files: Vec<AttachedFile>,
    pub comment: Option<String>,
    #[serde(default)]
    pub acceptance: Acceptance,
}

impl AnnotationPoint {
    /// A point drawn on this device that the server has not seen yet.
    pub fn new_local(geometry: PointGeometry) -> Self {
        Self::with_identity(PointIdentity::Pending(LocalPointId::generate()), geometry)
    }

    pub fn synced(server_id: ServerPointId, geometry: PointGeometry) -> Self {
        Self::with_identity(PointIdentity::Synced(server_id), geometry)
    }

    fn with_identity(identity: PointIdentity, geometry: PointGeometry) -> Self {
        Self {
            identity,
            geometry,
            files: Vec::new(),
            comment: None,
            acceptance: Acceptance::Pending,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_files(mut self, files: Vec<AttachedFile>) -> Self {
        self.files = files;
        self
    }

    pub fn with_acceptance(mut self, acceptance: Acceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn is_local_only(&self) -> bool {
        self.identity.is_local_only()
    }

    /// Takes over the user-editable fields of `edit`, keeping this point's identity.
    pub fn apply_edit(&mut self, edit: &AnnotationPoint) {
        self.geometry = edit.geometry;
        self.files = edit.files.clone();
        self.comment = edit.comment.clone();
        self.acceptance = edit.acceptance;
    }
}
