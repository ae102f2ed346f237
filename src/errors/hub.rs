//! Hub errors, resolved at the room boundary
//!
//! Every variant maps to a wire `kind` through [`HubError::kind`]. The first
//! four are the taxonomy clients are expected to act on; the rest describe
//! protocol misuse or a hub that is going away.

use thiserror::Error;

use super::StoreError;
use crate::collaboration::ConnectionId;
use crate::scene::ProjectId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    /// Join against a project the store does not know
    #[error("Project {0} not found")]
    ProjectNotFound(ProjectId),

    /// The room queue is full; retry later
    #[error("Room {project_id} is busy, retry later")]
    RoomBackpressure { project_id: ProjectId },

    /// The store rejected the mutation; nothing was applied or broadcast
    #[error("Failed to persist mutation: {0}")]
    PersistenceFailure(String),

    /// A recipient could not be reached
    #[error("Delivery to connection {0} failed")]
    TransportFailure(ConnectionId),

    /// The connection was never registered or has been dropped
    #[error("Connection {0} is not registered")]
    ConnectionNotFound(ConnectionId),

    /// Mutation from a connection that has not joined a room
    #[error("Connection has not joined a room")]
    NotJoined,

    /// Rejected by input validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Coordinator or room task is gone
    #[error("Hub unavailable: {0}")]
    Unavailable(String),
}

impl HubError {
    /// Wire name used in `error{kind, message}`
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::ProjectNotFound(_) => "ProjectNotFound",
            HubError::RoomBackpressure { .. } => "RoomBackpressure",
            HubError::PersistenceFailure(_) => "PersistenceFailure",
            HubError::TransportFailure(_) => "TransportFailure",
            HubError::ConnectionNotFound(_) => "ConnectionNotFound",
            HubError::NotJoined => "NotJoined",
            HubError::InvalidPayload(_) => "InvalidPayload",
            HubError::Unavailable(_) => "Unavailable",
        }
    }

    /// The same request may succeed if sent again later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::RoomBackpressure { .. } | HubError::PersistenceFailure(_)
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HubError::ProjectNotFound(_) | HubError::NotJoined | HubError::InvalidPayload(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::ProjectNotFound(_) | HubError::ConnectionNotFound(_) => "NOT_FOUND",
            HubError::RoomBackpressure { .. } => "BACKPRESSURE",
            HubError::PersistenceFailure(_) => "DATABASE_ERROR",
            HubError::TransportFailure(_) | HubError::Unavailable(_) => "UNAVAILABLE",
            HubError::NotJoined => "CONFLICT",
            HubError::InvalidPayload(_) => "VALIDATION_FAILED",
        }
    }
}

impl From<StoreError> for HubError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => HubError::ProjectNotFound(id),
            other => HubError::PersistenceFailure(other.to_string()),
        }
    }
}
