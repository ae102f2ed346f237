use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::dispatcher::BroadcastDispatcher;
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::room_actor::{RoomActor, RoomContext};
use super::types::{
    ConnectionId, CoordinatorCommand, HubStats, Mutation, Reply, RoomCommand, RoomHealthReport,
};
use crate::config::HubConfig;
use crate::errors::{HubError, HubResult};
use crate::scene::ProjectId;
use crate::server::websocket::types::ServerMessage;
use crate::store::ProjectStore;

/// A live room, or one whose queue has closed and whose termination notice
/// has not arrived yet. Commands for a retiring room wait in `pending` and are
/// replayed into its successor.
struct RoomSlot {
    actor: RoomActor,
    retiring: Option<Vec<RoomCommand>>,
}

/// Routes commands to room actors. Runs as a single task and never waits on a
/// room's turn, so one slow room cannot stall the others. It is also the only
/// place rooms are created or removed, which keeps at most one actor per
/// project alive.
pub struct RoomCoordinator {
    rooms: HashMap<ProjectId, RoomSlot>,
    command_rx: mpsc::Receiver<CoordinatorCommand>,
    room_ctx: RoomContext,
    registry: Arc<ConnectionRegistry>,
    room_queue_depth: usize,
    next_generation: u64,
    rooms_spawned: u64,
}

impl RoomCoordinator {
    pub fn spawn(store: Arc<dyn ProjectStore>, config: &HubConfig) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(config.coordinator_queue_depth);
        let registry = Arc::new(ConnectionRegistry::new());

        let coordinator = Self {
            rooms: HashMap::new(),
            command_rx: rx,
            room_ctx: RoomContext {
                store,
                registry: registry.clone(),
                dispatcher: BroadcastDispatcher::new(config.send_timeout()),
                idle_timeout: config.room_idle_timeout(),
                coordinator_tx: tx.clone(),
            },
            registry: registry.clone(),
            room_queue_depth: config.room_queue_depth,
            next_generation: 0,
            rooms_spawned: 0,
        };

        tokio::spawn(async move {
            coordinator.run().await;
        });

        info!("RoomCoordinator spawned");
        CoordinatorHandle {
            command_tx: tx,
            registry,
            outbound_buffer: config.outbound_buffer,
        }
    }

    async fn run(mut self) {
        info!("RoomCoordinator event loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                CoordinatorCommand::Join {
                    connection_id,
                    project_id,
                    user_label,
                    response,
                } => {
                    if !self.registry.contains(connection_id) {
                        let _ = response.send(Err(HubError::ConnectionNotFound(connection_id)));
                        continue;
                    }

                    // Joining another room implies leaving the current one.
                    if let Some(current) = self.registry.room_of(connection_id) {
                        if current != project_id {
                            self.registry.unbind(connection_id);
                            self.notify_departure(current, connection_id, None);
                        }
                    }

                    debug!("Connection {} joining project {}", connection_id, project_id);
                    self.route(
                        project_id,
                        RoomCommand::Join {
                            connection_id,
                            user_label,
                            response,
                        },
                    );
                }

                CoordinatorCommand::Leave {
                    connection_id,
                    response,
                } => match self.registry.unbind(connection_id) {
                    Some(project_id) => {
                        self.notify_departure(project_id, connection_id, Some(response))
                    }
                    None => {
                        let _ = response.send(Ok(()));
                    }
                },

                CoordinatorCommand::Submit {
                    connection_id,
                    mutation,
                    response,
                } => match self.registry.room_of(connection_id) {
                    Some(project_id) => self.route(
                        project_id,
                        RoomCommand::Mutate {
                            connection_id,
                            mutation,
                            response,
                        },
                    ),
                    None if self.registry.contains(connection_id) => {
                        let _ = response.send(Err(HubError::NotJoined));
                    }
                    None => {
                        let _ = response.send(Err(HubError::ConnectionNotFound(connection_id)));
                    }
                },

                CoordinatorCommand::Disconnect { connection_id } => {
                    if let Some(project_id) = self.registry.unregister(connection_id) {
                        self.notify_departure(project_id, connection_id, None);
                    }
                }

                CoordinatorCommand::MemberMoved {
                    project_id,
                    connection_id,
                } => {
                    debug!(
                        "Connection {} was moved out of project {} by a racing join",
                        connection_id, project_id
                    );
                    self.notify_departure(project_id, connection_id, None);
                }

                CoordinatorCommand::RoomTerminated {
                    project_id,
                    generation,
                    leftovers,
                } => self.retire(project_id, generation, leftovers),

                CoordinatorCommand::GetRoomHealth {
                    project_id,
                    response,
                } => match self.rooms.get(&project_id) {
                    Some(slot) if slot.retiring.is_none() => {
                        if let Err(err) = slot.actor.try_send(RoomCommand::Health { response }) {
                            err.into_inner().reject(HubError::RoomBackpressure { project_id });
                        }
                    }
                    _ => {
                        let _ = response.send(None);
                    }
                },

                CoordinatorCommand::GetStats { response } => {
                    let _ = response.send(self.stats());
                }

                CoordinatorCommand::Shutdown { response } => {
                    self.shutdown().await;
                    let _ = response.send(());
                    break;
                }
            }
        }

        info!("RoomCoordinator event loop ended");
    }

    /// Hand `cmd` to the project's room, creating the room if needed.
    fn route(&mut self, project_id: ProjectId, cmd: RoomCommand) {
        if !self.rooms.contains_key(&project_id) {
            self.spawn_room(project_id);
        }
        let queue_depth = self.room_queue_depth;
        let Some(slot) = self.rooms.get_mut(&project_id) else {
            return;
        };

        if let Some(pending) = slot.retiring.as_mut() {
            if pending.len() >= queue_depth {
                cmd.reject(HubError::RoomBackpressure { project_id });
            } else {
                pending.push(cmd);
            }
            return;
        }

        match slot.actor.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                warn!("Room {} queue full, rejecting {}", project_id, cmd.name());
                cmd.reject(HubError::RoomBackpressure { project_id });
            }
            Err(TrySendError::Closed(cmd)) => {
                debug!("Room {} is retiring, holding {}", project_id, cmd.name());
                slot.retiring = Some(vec![cmd]);
            }
        }
    }

    /// Tell a room one of its members is gone. The registry has already been
    /// updated, so this is never rejected. The room refreshes presence and
    /// retires the member's authorship after anything it queued earlier.
    fn notify_departure(
        &mut self,
        project_id: ProjectId,
        connection_id: ConnectionId,
        response: Option<Reply>,
    ) {
        let cmd = RoomCommand::Leave {
            connection_id,
            response,
        };
        let Some(slot) = self.rooms.get(&project_id) else {
            complete_leave(cmd);
            return;
        };
        if slot.retiring.is_some() {
            complete_leave(cmd);
            return;
        }

        match slot.actor.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                let sender = slot.actor.sender();
                tokio::spawn(async move {
                    if let Err(mpsc::error::SendError(cmd)) = sender.send(cmd).await {
                        complete_leave(cmd);
                    }
                });
            }
            Err(TrySendError::Closed(cmd)) => complete_leave(cmd),
        }
    }

    fn spawn_room(&mut self, project_id: ProjectId) {
        self.next_generation += 1;
        self.rooms_spawned += 1;
        let actor = RoomActor::spawn(
            project_id,
            self.next_generation,
            self.room_queue_depth,
            self.room_ctx.clone(),
        );
        self.rooms.insert(
            project_id,
            RoomSlot {
                actor,
                retiring: None,
            },
        );
    }

    fn retire(&mut self, project_id: ProjectId, generation: u64, leftovers: Vec<RoomCommand>) {
        let current = self
            .rooms
            .get(&project_id)
            .map(|slot| slot.actor.generation());
        if current != Some(generation) {
            warn!(
                "Ignoring termination of stale room {} (generation {})",
                project_id, generation
            );
            for cmd in leftovers {
                cmd.reject(HubError::Unavailable(format!("Room {} restarted", project_id)));
            }
            return;
        }

        let pending = self
            .rooms
            .remove(&project_id)
            .and_then(|slot| slot.retiring)
            .unwrap_or_default();

        let replay: Vec<RoomCommand> = leftovers
            .into_iter()
            .chain(pending)
            .filter_map(|cmd| match cmd {
                RoomCommand::Leave { .. } => {
                    complete_leave(cmd);
                    None
                }
                other => Some(other),
            })
            .collect();

        if replay.is_empty() {
            info!("Room {} removed", project_id);
            return;
        }

        info!(
            "Room {} replaying {} commands into a new actor",
            project_id,
            replay.len()
        );
        for cmd in replay {
            self.route(project_id, cmd);
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            active_rooms: self
                .rooms
                .values()
                .filter(|slot| slot.retiring.is_none())
                .count(),
            rooms_spawned: self.rooms_spawned,
            connections: self.registry.connection_count(),
        }
    }

    async fn shutdown(&mut self) {
        info!("RoomCoordinator shutting down {} rooms", self.rooms.len());

        for (project_id, slot) in self.rooms.drain() {
            if let Some(pending) = slot.retiring {
                for cmd in pending {
                    cmd.reject(HubError::Unavailable("Server shutting down".to_string()));
                }
                continue;
            }
            debug!("Shutting down room {}", project_id);
            slot.actor.shutdown().await;
        }
    }
}

/// A departure needs no room turn once the room is gone.
fn complete_leave(cmd: RoomCommand) {
    if let RoomCommand::Leave {
        response: Some(response),
        ..
    } = cmd
    {
        let _ = response.send(Ok(()));
    }
}

/// Handle to send commands to the RoomCoordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    command_tx: mpsc::Sender<CoordinatorCommand>,
    registry: Arc<ConnectionRegistry>,
    outbound_buffer: usize,
}

impl CoordinatorHandle {
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Register a transport connection. Events for it arrive on the returned
    /// receiver, which the transport drains onto the wire.
    pub fn register(&self) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        (self.registry.register(tx), rx)
    }

    pub async fn join(
        &self,
        connection_id: ConnectionId,
        project_id: ProjectId,
        user_label: String,
    ) -> HubResult<()> {
        self.request(|response| CoordinatorCommand::Join {
            connection_id,
            project_id,
            user_label,
            response,
        })
        .await
    }

    pub async fn leave(&self, connection_id: ConnectionId) -> HubResult<()> {
        self.request(|response| CoordinatorCommand::Leave {
            connection_id,
            response,
        })
        .await
    }

    pub async fn submit(&self, connection_id: ConnectionId, mutation: Mutation) -> HubResult<()> {
        self.request(|response| CoordinatorCommand::Submit {
            connection_id,
            mutation,
            response,
        })
        .await
    }

    /// Drop the connection from the hub. Safe to call more than once.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        if self
            .command_tx
            .send(CoordinatorCommand::Disconnect { connection_id })
            .await
            .is_err()
        {
            self.registry.unregister(connection_id);
        }
    }

    pub async fn room_health(&self, project_id: ProjectId) -> Option<RoomHealthReport> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(CoordinatorCommand::GetRoomHealth {
                project_id,
                response: tx,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn stats(&self) -> HubStats {
        let (tx, rx) = oneshot::channel();
        if self
            .command_tx
            .send(CoordinatorCommand::GetStats { response: tx })
            .await
            .is_err()
        {
            return HubStats::default();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .command_tx
            .send(CoordinatorCommand::Shutdown { response: tx })
            .await;
        let _ = rx.await;
    }

    async fn request<F>(&self, build: F) -> HubResult<()>
    where
        F: FnOnce(oneshot::Sender<HubResult<()>>) -> CoordinatorCommand,
    {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(build(tx))
            .await
            .map_err(|_| HubError::Unavailable("Coordinator unavailable".to_string()))?;

        rx.await
            .map_err(|_| HubError::Unavailable("Response channel closed".to_string()))?
    }
}
