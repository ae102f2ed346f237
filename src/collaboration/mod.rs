//! Real-time rooms: one actor per active project, a coordinator that routes
//! to them, and the connection registry both sides share.

mod coordinator;
mod dispatcher;
pub mod presence;
mod registry;
mod room_actor;
mod types;

pub use coordinator::{CoordinatorHandle, RoomCoordinator};
pub use dispatcher::{BroadcastDispatcher, DeliveryReport};
pub use registry::{ConnectionHandle, ConnectionRegistry, Member};
pub use types::{ConnectionId, HubStats, Mutation, RoomHealthReport, RoomPhase};
