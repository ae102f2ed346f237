use serde::Serialize;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::errors::{HubError, HubResult};
use crate::scene::{ProjectId, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-originated changes to a room's state
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    AddAnnotation { position: Vec3, text: String },
    PostChat { text: String },
    UpdateTransform { position: Vec3, rotation: Vec3, scale: Vec3 },
    UpdateCamera { camera: serde_json::Value },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddAnnotation { .. } => "annotation.add",
            Mutation::PostChat { .. } => "chat.post",
            Mutation::UpdateTransform { .. } => "transform.update",
            Mutation::UpdateCamera { .. } => "camera.update",
        }
    }
}

pub type Reply = oneshot::Sender<HubResult<()>>;

/// Commands sent to the RoomCoordinator
pub enum CoordinatorCommand {
    Join {
        connection_id: ConnectionId,
        project_id: ProjectId,
        user_label: String,
        response: Reply,
    },
    Leave {
        connection_id: ConnectionId,
        response: Reply,
    },
    Submit {
        connection_id: ConnectionId,
        mutation: Mutation,
        response: Reply,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    /// Sent by a room whose join moved `connection_id` out of `project_id`
    MemberMoved {
        project_id: ProjectId,
        connection_id: ConnectionId,
    },
    /// Sent by a room that has closed its queue; `leftovers` were never processed
    RoomTerminated {
        project_id: ProjectId,
        generation: u64,
        leftovers: Vec<RoomCommand>,
    },
    GetRoomHealth {
        project_id: ProjectId,
        response: oneshot::Sender<Option<RoomHealthReport>>,
    },
    GetStats {
        response: oneshot::Sender<HubStats>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

/// Commands sent to a RoomActor
pub enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        user_label: String,
        response: Reply,
    },
    /// The registry binding is already gone; the room drops the connection's
    /// authorship once every command queued ahead of this one has run
    Leave {
        connection_id: ConnectionId,
        response: Option<Reply>,
    },
    Mutate {
        connection_id: ConnectionId,
        mutation: Mutation,
        response: Reply,
    },
    Health {
        response: oneshot::Sender<Option<RoomHealthReport>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

impl RoomCommand {
    /// Answer the caller without processing the command.
    pub fn reject(self, err: HubError) {
        match self {
            RoomCommand::Join { response, .. } | RoomCommand::Mutate { response, .. } => {
                let _ = response.send(Err(err));
            }
            RoomCommand::Leave { response, .. } => {
                if let Some(response) = response {
                    let _ = response.send(Err(err));
                }
            }
            RoomCommand::Health { response } => {
                let _ = response.send(None);
            }
            RoomCommand::Shutdown { response } => {
                let _ = response.send(());
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoomCommand::Join { .. } => "join",
            RoomCommand::Leave { .. } => "leave",
            RoomCommand::Mutate { mutation, .. } => mutation.name(),
            RoomCommand::Health { .. } => "health",
            RoomCommand::Shutdown { .. } => "shutdown",
        }
    }
}

pub(crate) type RoomSender = mpsc::Sender<RoomCommand>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RoomPhase {
    /// Hydrating the snapshot from the store
    Created,
    Running,
    /// No members; terminates after the idle timeout
    Draining,
    Terminated,
}

/// Health report for a room
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHealthReport {
    pub project_id: ProjectId,
    pub generation: u64,
    pub phase: RoomPhase,
    pub members: usize,
    pub annotations: usize,
    pub chat_messages: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub active_rooms: usize,
    /// Room actors spawned since startup
    pub rooms_spawned: u64,
    pub connections: usize,
}
