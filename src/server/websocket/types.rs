use serde::{Deserialize, Serialize};

use crate::errors::HubError;
use crate::scene::{Annotation, ChatMessage, Project, ProjectId, Vec3};

/// Client → Server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join { data: JoinData },
    #[serde(rename = "leave")]
    Leave {},
    #[serde(rename = "annotation.add")]
    AddAnnotation { data: AddAnnotationData },
    #[serde(rename = "chat.post")]
    PostChat { data: PostChatData },
    #[serde(rename = "transform.update")]
    UpdateTransform { data: TransformUpdateData },
    #[serde(rename = "camera.update")]
    UpdateCamera { data: CameraUpdateData },
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub project_id: ProjectId,
    pub user_label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAnnotationData {
    pub position: Vec3,
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostChatData {
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformUpdateData {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraUpdateData {
    pub camera: serde_json::Value,
}

/// Server → Client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Join reply: the full room state at the moment of joining
    #[serde(rename = "room.snapshot")]
    RoomSnapshot { data: Project },
    #[serde(rename = "presence.update")]
    PresenceUpdate { data: PresenceData },
    #[serde(rename = "annotation.added")]
    AnnotationAdded { data: Annotation },
    #[serde(rename = "chat.posted")]
    ChatPosted { data: ChatMessage },
    #[serde(rename = "transform.updated")]
    TransformUpdated { data: TransformUpdatedData },
    #[serde(rename = "camera.updated")]
    CameraUpdated { data: CameraUpdatedData },
    #[serde(rename = "error")]
    Error { kind: String, message: String },
    #[serde(rename = "pong")]
    Pong,
}

impl ServerMessage {
    pub fn from_error(err: &HubError) -> Self {
        ServerMessage::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Short name for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::RoomSnapshot { .. } => "room.snapshot",
            ServerMessage::PresenceUpdate { .. } => "presence.update",
            ServerMessage::AnnotationAdded { .. } => "annotation.added",
            ServerMessage::ChatPosted { .. } => "chat.posted",
            ServerMessage::TransformUpdated { .. } => "transform.updated",
            ServerMessage::CameraUpdated { .. } => "camera.updated",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong => "pong",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceData {
    pub project_id: ProjectId,
    /// Labels of bound connections, in join order
    pub users: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformUpdatedData {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
    pub author: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraUpdatedData {
    pub camera: serde_json::Value,
    pub author: String,
    pub at: chrono::DateTime<chrono::Utc>,
}
