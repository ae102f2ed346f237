use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::dispatcher::BroadcastDispatcher;
use super::presence::presence_update;
use super::registry::{ConnectionRegistry, Member};
use super::types::{
    ConnectionId, CoordinatorCommand, Mutation, RoomCommand, RoomHealthReport, RoomPhase,
    RoomSender,
};
use crate::errors::{HubError, HubResult, StoreError};
use crate::scene::{Annotation, CameraState, ChatMessage, Project, ProjectId, TransformState};
use crate::server::websocket::types::{CameraUpdatedData, ServerMessage, TransformUpdatedData};
use crate::store::ProjectStore;

/// Everything a room needs besides its own snapshot. Shared by all rooms.
#[derive(Clone)]
pub(crate) struct RoomContext {
    pub store: Arc<dyn ProjectStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: BroadcastDispatcher,
    pub idle_timeout: Duration,
    pub coordinator_tx: mpsc::Sender<CoordinatorCommand>,
}

/// Handle to the task that owns one project's live state
pub(crate) struct RoomActor {
    project_id: ProjectId,
    generation: u64,
    command_tx: RoomSender,
    task_handle: tokio::task::JoinHandle<()>,
}

impl RoomActor {
    pub fn spawn(
        project_id: ProjectId,
        generation: u64,
        queue_depth: usize,
        ctx: RoomContext,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth);

        let task_handle = tokio::spawn(async move {
            let state = RoomState {
                project_id,
                generation,
                phase: RoomPhase::Created,
                snapshot: Project::new(project_id, ""),
                authors: HashMap::new(),
                ctx,
            };

            state.run(rx).await;
        });

        debug!("RoomActor spawned for project {} (generation {})", project_id, generation);

        Self {
            project_id,
            generation,
            command_tx: tx,
            task_handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn try_send(&self, cmd: RoomCommand) -> Result<(), TrySendError<RoomCommand>> {
        self.command_tx.try_send(cmd)
    }

    pub fn sender(&self) -> RoomSender {
        self.command_tx.clone()
    }

    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self
            .command_tx
            .send(RoomCommand::Shutdown { response: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
        if let Err(err) = self.task_handle.await {
            warn!("Room {} task ended abnormally: {}", self.project_id, err);
        }
    }
}

/// State owned by a room task. Only the task touches it, so every command
/// runs as one uninterrupted turn against a consistent snapshot.
struct RoomState {
    project_id: ProjectId,
    generation: u64,
    phase: RoomPhase,
    snapshot: Project,
    /// Connections admitted by this room whose `Leave` has not been processed
    /// yet, with the label their mutations are attributed to. The registry can
    /// drop a binding before this room reaches the matching `Leave`, so
    /// authorship is checked here to keep queued mutations in FIFO order.
    authors: HashMap<ConnectionId, String>,
    ctx: RoomContext,
}

impl RoomState {
    async fn run(mut self, mut command_rx: mpsc::Receiver<RoomCommand>) {
        debug!("RoomState event loop started for project {}", self.project_id);

        if let Err(err) = self.hydrate().await {
            warn!("Room {} failed to hydrate: {}", self.project_id, err);
            command_rx.close();
            while let Some(cmd) = command_rx.recv().await {
                cmd.reject(err.clone());
            }
            self.phase = RoomPhase::Terminated;
            self.notify_terminated(Vec::new()).await;
            return;
        }

        loop {
            match tokio::time::timeout(self.ctx.idle_timeout, command_rx.recv()).await {
                Ok(Some(cmd)) => {
                    if !self.handle(cmd).await {
                        debug!("RoomState shut down for project {}", self.project_id);
                        return;
                    }
                }
                Ok(None) => {
                    self.phase = RoomPhase::Terminated;
                    debug!("Room {} queue closed", self.project_id);
                    return;
                }
                Err(_) => {
                    if self.ctx.registry.member_count(self.project_id) == 0 {
                        break;
                    }
                }
            }
        }

        // Nothing may slip in between closing and handing back the queue.
        self.phase = RoomPhase::Terminated;
        command_rx.close();
        let mut leftovers = Vec::new();
        while let Some(cmd) = command_rx.recv().await {
            leftovers.push(cmd);
        }

        info!(
            "Room {} terminated after idle timeout ({} queued commands handed back)",
            self.project_id,
            leftovers.len()
        );
        self.notify_terminated(leftovers).await;
    }

    async fn hydrate(&mut self) -> HubResult<()> {
        self.snapshot = self.ctx.store.load(self.project_id).await?;
        self.phase = RoomPhase::Running;
        info!(
            "Room {} hydrated: {} annotations, {} chat messages",
            self.project_id,
            self.snapshot.annotations.len(),
            self.snapshot.chat.len()
        );
        Ok(())
    }

    /// Runs one command. Returns false once the room has shut down.
    async fn handle(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Join {
                connection_id,
                user_label,
                response,
            } => {
                let result = self.admit(connection_id, &user_label).await;
                let _ = response.send(result);
            }

            RoomCommand::Leave {
                connection_id,
                response,
            } => {
                self.depart(connection_id).await;
                if let Some(response) = response {
                    let _ = response.send(Ok(()));
                }
            }

            RoomCommand::Mutate {
                connection_id,
                mutation,
                response,
            } => {
                let name = mutation.name();
                let result = self.apply(connection_id, mutation).await;
                if let Err(err) = &result {
                    debug!(
                        "Room {} rejected {} from {}: {}",
                        self.project_id, name, connection_id, err
                    );
                }
                let _ = response.send(result);
            }

            RoomCommand::Health { response } => {
                let _ = response.send(Some(self.health_report()));
            }

            RoomCommand::Shutdown { response } => {
                self.shutdown().await;
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    async fn admit(&mut self, connection_id: ConnectionId, user_label: &str) -> HubResult<()> {
        // Model references are written outside the hub, so re-read them.
        self.snapshot.models = self.ctx.store.load_models(self.project_id).await?;

        if let Some(previous) =
            self.ctx
                .registry
                .bind_to_room(connection_id, self.project_id, user_label)?
        {
            debug!(
                "Connection {} moved from room {} to room {}",
                connection_id, previous, self.project_id
            );
            let notice = CoordinatorCommand::MemberMoved {
                project_id: previous,
                connection_id,
            };
            if self.ctx.coordinator_tx.try_send(notice).is_err() {
                warn!(
                    "Room {} could not report {} leaving room {}",
                    self.project_id, connection_id, previous
                );
            }
        }

        let joiner = self
            .ctx
            .registry
            .members(self.project_id)
            .into_iter()
            .find(|member| member.connection_id == connection_id)
            .ok_or(HubError::ConnectionNotFound(connection_id))?;

        let snapshot = ServerMessage::RoomSnapshot {
            data: self.snapshot.clone(),
        };
        let report = self.ctx.dispatcher.deliver(&[joiner], &snapshot).await;
        if !report.unreachable.is_empty() {
            warn!(
                "Room {} could not deliver snapshot to {}",
                self.project_id, connection_id
            );
            self.ctx.registry.unregister(connection_id);
            self.authors.remove(&connection_id);
            self.refresh_phase();
            return Err(HubError::TransportFailure(connection_id));
        }

        self.authors.insert(connection_id, user_label.to_string());
        info!("{} joined room {}", user_label, self.project_id);
        let presence = presence_update(&self.ctx.registry, self.project_id);
        self.broadcast(presence, None).await;
        Ok(())
    }

    /// Processes a queued `Leave`. The registry binding may already be gone;
    /// a connection that rejoined before this turn keeps its authorship.
    async fn depart(&mut self, connection_id: ConnectionId) {
        debug!("Connection {} left room {}", connection_id, self.project_id);
        if self
            .ctx
            .registry
            .member_label(connection_id, self.project_id)
            .is_none()
        {
            self.authors.remove(&connection_id);
        }
        let presence = presence_update(&self.ctx.registry, self.project_id);
        self.broadcast(presence, None).await;
    }

    /// Persist, then fold into the snapshot, then broadcast. A failed write
    /// leaves the snapshot untouched and reaches only the submitter.
    async fn apply(&mut self, connection_id: ConnectionId, mutation: Mutation) -> HubResult<()> {
        let author = self
            .authors
            .get(&connection_id)
            .cloned()
            .ok_or(HubError::NotJoined)?;
        let project_id = self.project_id;
        let at = Utc::now();

        match mutation {
            Mutation::AddAnnotation { position, text } => {
                let annotation = Annotation {
                    seq: self.snapshot.next_annotation_seq(),
                    position,
                    text,
                    author,
                    at,
                };
                self.ctx
                    .store
                    .append_annotation(self.project_id, &annotation)
                    .await
                    .map_err(|err| persistence_failure(project_id, "annotation", err))?;

                self.snapshot.annotations.push(annotation.clone());
                self.broadcast(ServerMessage::AnnotationAdded { data: annotation }, None)
                    .await;
            }

            Mutation::PostChat { text } => {
                let message = ChatMessage {
                    seq: self.snapshot.next_chat_seq(),
                    author,
                    text,
                    at,
                };
                self.ctx
                    .store
                    .append_chat(self.project_id, &message)
                    .await
                    .map_err(|err| persistence_failure(project_id, "chat message", err))?;

                self.snapshot.chat.push(message.clone());
                self.broadcast(ServerMessage::ChatPosted { data: message }, None)
                    .await;
            }

            Mutation::UpdateTransform {
                position,
                rotation,
                scale,
            } => {
                let transform = TransformState {
                    position,
                    rotation,
                    scale,
                    last_writer: Some(author.clone()),
                    updated_at: Some(at),
                };
                self.ctx
                    .store
                    .set_transform(self.project_id, &transform)
                    .await
                    .map_err(|err| persistence_failure(project_id, "transform", err))?;

                self.snapshot.transform = transform;
                let event = ServerMessage::TransformUpdated {
                    data: TransformUpdatedData {
                        position,
                        rotation,
                        scale,
                        author,
                        at,
                    },
                };
                self.broadcast(event, Some(connection_id)).await;
            }

            Mutation::UpdateCamera { camera } => {
                let state = CameraState {
                    camera: camera.clone(),
                    last_writer: Some(author.clone()),
                    updated_at: Some(at),
                };
                self.ctx
                    .store
                    .set_camera(self.project_id, &state)
                    .await
                    .map_err(|err| persistence_failure(project_id, "camera", err))?;

                self.snapshot.camera = Some(state);
                let event = ServerMessage::CameraUpdated {
                    data: CameraUpdatedData { camera, author, at },
                };
                self.broadcast(event, Some(connection_id)).await;
            }
        }

        Ok(())
    }

    /// Deliver `event` to every member except `exclude`. Recipients that
    /// cannot keep up are dropped from the registry and the survivors get a
    /// fresh presence list, repeated until a round drops nobody.
    async fn broadcast(&mut self, event: ServerMessage, exclude: Option<ConnectionId>) {
        let recipients: Vec<Member> = self
            .ctx
            .registry
            .members(self.project_id)
            .into_iter()
            .filter(|member| Some(member.connection_id) != exclude)
            .collect();

        let mut unreachable = self.ctx.dispatcher.deliver(&recipients, &event).await.unreachable;
        while !unreachable.is_empty() {
            for connection_id in &unreachable {
                warn!(
                    "Evicting unreachable connection {} from room {}",
                    connection_id, self.project_id
                );
                self.ctx.registry.unregister(*connection_id);
                self.authors.remove(connection_id);
            }

            let members = self.ctx.registry.members(self.project_id);
            let presence = presence_update(&self.ctx.registry, self.project_id);
            unreachable = self.ctx.dispatcher.deliver(&members, &presence).await.unreachable;
        }

        self.refresh_phase();
    }

    fn refresh_phase(&mut self) {
        let empty = self.ctx.registry.member_count(self.project_id) == 0;
        match (self.phase, empty) {
            (RoomPhase::Running, true) => {
                debug!("Room {} is empty, draining", self.project_id);
                self.phase = RoomPhase::Draining;
            }
            (RoomPhase::Draining, false) => self.phase = RoomPhase::Running,
            _ => {}
        }
    }

    fn health_report(&self) -> RoomHealthReport {
        RoomHealthReport {
            project_id: self.project_id,
            generation: self.generation,
            phase: self.phase,
            members: self.ctx.registry.member_count(self.project_id),
            annotations: self.snapshot.annotations.len(),
            chat_messages: self.snapshot.chat.len(),
        }
    }

    async fn shutdown(&mut self) {
        debug!("RoomState shutting down for project {}", self.project_id);

        let members = self.ctx.registry.members(self.project_id);
        for member in &members {
            self.ctx.registry.unbind(member.connection_id);
        }
        self.authors.clear();

        let notice = ServerMessage::from_error(&HubError::Unavailable(
            "Server shutting down".to_string(),
        ));
        let report = self.ctx.dispatcher.deliver(&members, &notice).await;
        for connection_id in report.unreachable {
            warn!("Failed to send shutdown notice to {}", connection_id);
        }

        self.phase = RoomPhase::Terminated;
    }

    async fn notify_terminated(&self, leftovers: Vec<RoomCommand>) {
        let notice = CoordinatorCommand::RoomTerminated {
            project_id: self.project_id,
            generation: self.generation,
            leftovers,
        };
        if let Err(mpsc::error::SendError(notice)) = self.ctx.coordinator_tx.send(notice).await {
            if let CoordinatorCommand::RoomTerminated { leftovers, .. } = notice {
                for cmd in leftovers {
                    cmd.reject(HubError::Unavailable("Coordinator stopped".to_string()));
                }
            }
        }
    }
}

fn persistence_failure(project_id: ProjectId, what: &str, err: StoreError) -> HubError {
    warn!(
        "Room {} failed to persist {} [{}]: {}",
        project_id,
        what,
        err.error_code(),
        err
    );
    HubError::PersistenceFailure(err.to_string())
}
