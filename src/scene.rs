//! Scene document types shared by the store, the room actors and the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ProjectId = i32;

/// A 3-vector serialised as `[x, y, z]`.
pub type Vec3 = [f64; 3];

pub fn is_finite_vec3(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

/// A 3D note pinned to the scene. `seq` is assigned by the room, never the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub seq: i64,
    pub position: Vec3,
    pub text: String,
    pub author: String,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub seq: i64,
    pub author: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Object transform. Last writer wins; no history is kept.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformState {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    #[serde(default)]
    pub last_writer: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
            last_writer: None,
            updated_at: None,
        }
    }
}

/// Viewer camera. The payload is opaque to the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraState {
    pub camera: serde_json::Value,
    #[serde(default)]
    pub last_writer: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Reference to an uploaded model file. Written by the CRUD layer only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub id: i32,
    pub name: String,
    pub url: String,
}

/// The persisted project document, and the in-memory snapshot a room holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub models: Vec<ModelRef>,
    pub annotations: Vec<Annotation>,
    pub chat: Vec<ChatMessage>,
    pub transform: TransformState,
    pub camera: Option<CameraState>,
}

impl Project {
    pub fn new(id: ProjectId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            models: Vec::new(),
            annotations: Vec::new(),
            chat: Vec::new(),
            transform: TransformState::default(),
            camera: None,
        }
    }

    /// Next annotation sequence number (sequences start at 1).
    pub fn next_annotation_seq(&self) -> i64 {
        self.annotations.last().map_or(1, |a| a.seq + 1)
    }

    pub fn next_chat_seq(&self) -> i64 {
        self.chat.last().map_or(1, |m| m.seq + 1)
    }
}
