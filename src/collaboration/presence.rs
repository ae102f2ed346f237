//! Presence is a derived view over the connection registry. It has no state
//! of its own; the room recomputes it inside the turn that changed membership.

use super::registry::ConnectionRegistry;
use crate::scene::ProjectId;
use crate::server::websocket::types::{PresenceData, ServerMessage};

/// User labels currently bound to the room, ordered by join time
pub fn current_users(registry: &ConnectionRegistry, project_id: ProjectId) -> Vec<String> {
    registry.list_members(project_id)
}

pub fn presence_update(registry: &ConnectionRegistry, project_id: ProjectId) -> ServerMessage {
    ServerMessage::PresenceUpdate {
        data: PresenceData {
            project_id,
            users: current_users(registry, project_id),
        },
    }
}
