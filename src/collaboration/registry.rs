use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use super::types::ConnectionId;
use crate::errors::{HubError, HubResult};
use crate::scene::ProjectId;
use crate::server::websocket::types::ServerMessage;

/// Returned by [`ConnectionRegistry::register`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
}

/// A connection bound to a room, as seen at the moment of the lookup
#[derive(Clone, Debug)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub user_label: String,
    pub joined_at: DateTime<Utc>,
    pub outbound: mpsc::Sender<ServerMessage>,
}

#[derive(Clone, Copy, Debug)]
struct Binding {
    project_id: ProjectId,
    join_order: u64,
}

struct ConnectionEntry {
    outbound: mpsc::Sender<ServerMessage>,
    user_label: Option<String>,
    joined_at: Option<DateTime<Utc>>,
    binding: Option<Binding>,
}

/// Every live connection and the room it is bound to.
///
/// Bindings for a project are only changed from that project's room turn
/// (join) or ahead of the room being told (leave, disconnect), so a room that
/// reads its members inside a turn sees a consistent view.
///
/// The two maps are never locked at the same time.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<ProjectId, BTreeMap<u64, ConnectionId>>,
    join_counter: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            join_counter: AtomicU64::new(0),
        }
    }

    /// Track a new transport connection. It starts outside any room.
    pub fn register(&self, outbound: mpsc::Sender<ServerMessage>) -> ConnectionHandle {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            ConnectionEntry {
                outbound,
                user_label: None,
                joined_at: None,
                binding: None,
            },
        );
        debug!("Registered connection {}", id);
        ConnectionHandle { id }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Bind `id` to `project_id`. Re-binding to the same room keeps the
    /// original join position and only updates the label; binding to another
    /// room moves the connection. Returns the room it was moved out of.
    pub fn bind_to_room(
        &self,
        id: ConnectionId,
        project_id: ProjectId,
        user_label: &str,
    ) -> HubResult<Option<ProjectId>> {
        let (previous, binding) = {
            let mut entry = self
                .connections
                .get_mut(&id)
                .ok_or(HubError::ConnectionNotFound(id))?;

            entry.user_label = Some(user_label.to_string());

            let current = entry.binding;
            match current {
                Some(existing) if existing.project_id == project_id => return Ok(None),
                previous => {
                    let binding = Binding {
                        project_id,
                        join_order: self.join_counter.fetch_add(1, Ordering::SeqCst),
                    };
                    entry.binding = Some(binding);
                    entry.joined_at = Some(Utc::now());
                    (previous, binding)
                }
            }
        };

        if let Some(previous) = previous {
            self.remove_from_index(previous, id);
        }
        self.rooms
            .entry(project_id)
            .or_default()
            .insert(binding.join_order, id);

        Ok(previous.map(|b| b.project_id))
    }

    /// Drop the room binding, keeping the connection registered.
    pub fn unbind(&self, id: ConnectionId) -> Option<ProjectId> {
        let binding = {
            let mut entry = self.connections.get_mut(&id)?;
            entry.joined_at = None;
            entry.binding.take()?
        };
        self.remove_from_index(binding, id);
        Some(binding.project_id)
    }

    /// Forget the connection. Idempotent; returns the room it was bound to.
    pub fn unregister(&self, id: ConnectionId) -> Option<ProjectId> {
        let (_, entry) = self.connections.remove(&id)?;
        debug!("Unregistered connection {}", id);
        let binding = entry.binding?;
        self.remove_from_index(binding, id);
        Some(binding.project_id)
    }

    pub fn room_of(&self, id: ConnectionId) -> Option<ProjectId> {
        self.connections
            .get(&id)
            .and_then(|entry| entry.binding.map(|b| b.project_id))
    }

    /// Label of `id` if it is currently bound to `project_id`
    pub fn member_label(&self, id: ConnectionId, project_id: ProjectId) -> Option<String> {
        let entry = self.connections.get(&id)?;
        match entry.binding {
            Some(binding) if binding.project_id == project_id => entry.user_label.clone(),
            _ => None,
        }
    }

    pub fn outbound(&self, id: ConnectionId) -> Option<mpsc::Sender<ServerMessage>> {
        self.connections.get(&id).map(|entry| entry.outbound.clone())
    }

    /// Members of a room ordered by join time
    pub fn members(&self, project_id: ProjectId) -> Vec<Member> {
        let ordered: Vec<(u64, ConnectionId)> = match self.rooms.get(&project_id) {
            Some(index) => index.iter().map(|(order, id)| (*order, *id)).collect(),
            None => return Vec::new(),
        };

        ordered
            .into_iter()
            .filter_map(|(order, id)| {
                let entry = self.connections.get(&id)?;
                let binding = entry.binding?;
                if binding.project_id != project_id || binding.join_order != order {
                    return None;
                }
                Some(Member {
                    connection_id: id,
                    user_label: entry.user_label.clone().unwrap_or_default(),
                    joined_at: entry.joined_at.unwrap_or_else(Utc::now),
                    outbound: entry.outbound.clone(),
                })
            })
            .collect()
    }

    /// User labels of a room's members, ordered by join time
    pub fn list_members(&self, project_id: ProjectId) -> Vec<String> {
        self.members(project_id)
            .into_iter()
            .map(|member| member.user_label)
            .collect()
    }

    pub fn member_count(&self, project_id: ProjectId) -> usize {
        self.members(project_id).len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn remove_from_index(&self, binding: Binding, id: ConnectionId) {
        let now_empty = match self.rooms.get_mut(&binding.project_id) {
            Some(mut index) => {
                if index.get(&binding.join_order) == Some(&id) {
                    index.remove(&binding.join_order);
                }
                index.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms
                .remove_if(&binding.project_id, |_, index| index.is_empty());
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound() -> mpsc::Sender<ServerMessage> {
        let (tx, _rx) = mpsc::channel(4);
        tx
    }

    #[test]
    fn test_register_starts_unbound() {
        let registry = ConnectionRegistry::new();
        let handle = registry.register(outbound());

        assert!(registry.contains(handle.id));
        assert_eq!(registry.room_of(handle.id), None);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_members_ordered_by_join() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(outbound());
        let b = registry.register(outbound());
        let c = registry.register(outbound());

        registry.bind_to_room(b.id, 1, "bob").unwrap();
        registry.bind_to_room(a.id, 1, "alice").unwrap();
        registry.bind_to_room(c.id, 2, "carol").unwrap();

        assert_eq!(registry.list_members(1), vec!["bob", "alice"]);
        assert_eq!(registry.list_members(2), vec!["carol"]);
        assert!(registry.list_members(3).is_empty());
    }

    #[test]
    fn test_rebind_same_room_keeps_position() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(outbound());
        let b = registry.register(outbound());

        registry.bind_to_room(a.id, 1, "alice").unwrap();
        registry.bind_to_room(b.id, 1, "bob").unwrap();
        let moved = registry.bind_to_room(a.id, 1, "alice2").unwrap();

        assert_eq!(moved, None);
        assert_eq!(registry.list_members(1), vec!["alice2", "bob"]);
    }

    #[test]
    fn test_bind_to_other_room_moves_connection() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(outbound());

        registry.bind_to_room(a.id, 1, "alice").unwrap();
        let moved = registry.bind_to_room(a.id, 2, "alice").unwrap();

        assert_eq!(moved, Some(1));
        assert!(registry.list_members(1).is_empty());
        assert_eq!(registry.list_members(2), vec!["alice"]);
    }

    #[test]
    fn test_bind_unknown_connection_fails() {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        assert_eq!(
            registry.bind_to_room(id, 1, "ghost"),
            Err(HubError::ConnectionNotFound(id))
        );
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(outbound());
        registry.bind_to_room(a.id, 5, "alice").unwrap();

        assert_eq!(registry.unregister(a.id), Some(5));
        assert_eq!(registry.unregister(a.id), None);
        assert!(registry.list_members(5).is_empty());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_unbind_keeps_registration() {
        let registry = ConnectionRegistry::new();
        let a = registry.register(outbound());
        registry.bind_to_room(a.id, 5, "alice").unwrap();

        assert_eq!(registry.unbind(a.id), Some(5));
        assert_eq!(registry.unbind(a.id), None);
        assert!(registry.contains(a.id));
        assert_eq!(registry.member_label(a.id, 5), None);
    }
}
