//! Room hub behavior: ordering, snapshots, presence, lifecycle and failures

use async_trait::async_trait;
use futures_util::future::join_all;
use scenehub::collaboration::{ConnectionId, CoordinatorHandle, Mutation, RoomCoordinator};
use scenehub::config::HubConfig;
use scenehub::errors::{HubError, StoreError, StoreResult};
use scenehub::scene::{Annotation, CameraState, ChatMessage, Project, ProjectId, TransformState};
use scenehub::server::websocket::types::ServerMessage;
use scenehub::store::{MemoryProjectStore, ProjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

fn test_config() -> HubConfig {
    HubConfig {
        outbound_buffer: 512,
        ..HubConfig::default()
    }
}

struct Client {
    id: ConnectionId,
    rx: mpsc::Receiver<ServerMessage>,
}

impl Client {
    fn connect(hub: &CoordinatorHandle) -> Self {
        let (handle, rx) = hub.register();
        Self { id: handle.id, rx }
    }

    /// Everything already queued for this client
    fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    async fn next_presence(&mut self) -> Vec<String> {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for presence")
                .expect("outbound closed");
            if let ServerMessage::PresenceUpdate { data } = msg {
                return data.users;
            }
        }
    }
}

fn chat(text: &str) -> Mutation {
    Mutation::PostChat {
        text: text.to_string(),
    }
}

fn snapshot_of(messages: &[ServerMessage]) -> Project {
    messages
        .iter()
        .find_map(|msg| match msg {
            ServerMessage::RoomSnapshot { data } => Some(data.clone()),
            _ => None,
        })
        .expect("no snapshot received")
}

async fn memory_hub() -> (CoordinatorHandle, Arc<MemoryProjectStore>, ProjectId) {
    let store = Arc::new(MemoryProjectStore::new());
    let project_id = store.create_project("Warehouse").await;
    let hub = RoomCoordinator::spawn(store.clone(), &test_config());
    (hub, store, project_id)
}

#[tokio::test]
async fn test_first_join_and_annotation_scenario() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);

    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    let snapshot = snapshot_of(&ada.drain());
    assert!(snapshot.annotations.is_empty());
    assert!(snapshot.chat.is_empty());
    assert_eq!(snapshot.transform, TransformState::default());

    hub.submit(
        ada.id,
        Mutation::AddAnnotation {
            position: [1.0, 2.0, 3.0],
            text: "hello".to_string(),
        },
    )
    .await
    .unwrap();

    let added: Vec<Annotation> = ada
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::AnnotationAdded { data } => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].seq, 1);
    assert_eq!(added[0].position, [1.0, 2.0, 3.0]);
    assert_eq!(added[0].text, "hello");
    assert_eq!(added[0].author, "ada");

    let mut bob = Client::connect(&hub);
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    let snapshot = snapshot_of(&bob.drain());
    assert_eq!(snapshot.annotations, added);
}

#[tokio::test]
async fn test_members_observe_identical_order() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();

    let submissions = (0..20).map(|i| {
        let hub = hub.clone();
        let (id, text) = if i % 2 == 0 {
            (ada.id, format!("ada-{}", i))
        } else {
            (bob.id, format!("bob-{}", i))
        };
        async move { hub.submit(id, chat(&text)).await }
    });
    for result in join_all(submissions).await {
        result.unwrap();
    }

    let posted = |messages: Vec<ServerMessage>| -> Vec<(i64, String)> {
        messages
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::ChatPosted { data } => Some((data.seq, data.text)),
                _ => None,
            })
            .collect()
    };
    let seen_by_ada = posted(ada.drain());
    let seen_by_bob = posted(bob.drain());

    assert_eq!(seen_by_ada.len(), 20);
    assert_eq!(seen_by_ada, seen_by_bob);
    let seqs: Vec<i64> = seen_by_ada.iter().map(|(seq, _)| *seq).collect();
    assert_eq!(seqs, (1..=20).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_snapshot_reflects_exactly_prior_mutations() {
    let (hub, _store, project_id) = memory_hub().await;
    let ada = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();

    let writer = {
        let hub = hub.clone();
        let ada_id = ada.id;
        tokio::spawn(async move {
            for i in 0..30 {
                hub.submit(
                    ada_id,
                    Mutation::AddAnnotation {
                        position: [i as f64, 0.0, 0.0],
                        text: format!("note {}", i),
                    },
                )
                .await
                .unwrap();
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(1)).await;
    let mut carol = Client::connect(&hub);
    hub.join(carol.id, project_id, "carol".to_string()).await.unwrap();
    writer.await.unwrap();

    let messages = carol.drain();
    let snapshot = snapshot_of(&messages);
    let before = snapshot.annotations.len() as i64;
    let snapshot_seqs: Vec<i64> = snapshot.annotations.iter().map(|a| a.seq).collect();
    assert_eq!(snapshot_seqs, (1..=before).collect::<Vec<i64>>());

    let after: Vec<i64> = messages
        .iter()
        .filter_map(|msg| match msg {
            ServerMessage::AnnotationAdded { data } => Some(data.seq),
            _ => None,
        })
        .collect();
    assert_eq!(after, (before + 1..=30).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_concurrent_joins_spawn_single_room() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut clients: Vec<Client> = (0..20).map(|_| Client::connect(&hub)).collect();

    let joins = clients.iter().enumerate().map(|(i, client)| {
        let hub = hub.clone();
        let id = client.id;
        async move { hub.join(id, project_id, format!("user-{}", i)).await }
    });
    for result in join_all(joins).await {
        result.unwrap();
    }

    let stats = hub.stats().await;
    assert_eq!(stats.rooms_spawned, 1);
    assert_eq!(stats.active_rooms, 1);
    assert_eq!(stats.connections, 20);

    let health = hub.room_health(project_id).await.unwrap();
    assert_eq!(health.members, 20);
    assert_eq!(hub.registry().list_members(project_id).len(), 20);

    for client in clients.iter_mut() {
        assert_eq!(snapshot_of(&client.drain()).id, project_id);
    }
}

#[tokio::test]
async fn test_transform_last_writer_wins_and_skips_submitter() {
    let (hub, store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    ada.drain();
    bob.drain();

    hub.submit(
        ada.id,
        Mutation::UpdateTransform {
            position: [1.0, 1.0, 1.0],
            rotation: [0.0, 0.5, 0.0],
            scale: [2.0, 2.0, 2.0],
        },
    )
    .await
    .unwrap();
    hub.submit(
        bob.id,
        Mutation::UpdateTransform {
            position: [5.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 3.0],
        },
    )
    .await
    .unwrap();

    let authors = |messages: Vec<ServerMessage>| -> Vec<String> {
        messages
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::TransformUpdated { data } => Some(data.author),
                _ => None,
            })
            .collect()
    };
    assert_eq!(authors(ada.drain()), vec!["bob"]);
    assert_eq!(authors(bob.drain()), vec!["ada"]);

    let persisted = store.load(project_id).await.unwrap().transform;
    assert_eq!(persisted.position, [5.0, 0.0, 0.0]);
    assert_eq!(persisted.rotation, [0.0, 0.0, 0.0]);
    assert_eq!(persisted.scale, [1.0, 1.0, 3.0]);
    assert_eq!(persisted.last_writer.as_deref(), Some("bob"));
}

#[tokio::test]
async fn test_camera_update_reaches_others_and_snapshot() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    ada.drain();
    bob.drain();

    let camera = serde_json::json!({ "position": [0, 4, 10], "fov": 50 });
    hub.submit(ada.id, Mutation::UpdateCamera { camera: camera.clone() })
        .await
        .unwrap();

    assert!(ada.drain().is_empty());
    match bob.drain().as_slice() {
        [ServerMessage::CameraUpdated { data }] => {
            assert_eq!(data.camera, camera);
            assert_eq!(data.author, "ada");
        }
        other => panic!("unexpected messages {:?}", other),
    }

    let mut carol = Client::connect(&hub);
    hub.join(carol.id, project_id, "carol".to_string()).await.unwrap();
    let snapshot = snapshot_of(&carol.drain());
    assert_eq!(snapshot.camera.unwrap().camera, camera);
}

#[tokio::test]
async fn test_disconnect_without_leave_updates_presence() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    let carol = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(carol.id, project_id, "carol".to_string()).await.unwrap();
    ada.drain();

    hub.disconnect(carol.id).await;

    assert_eq!(ada.next_presence().await, vec!["ada"]);
    assert_eq!(hub.stats().await.connections, 1);
    assert_eq!(
        hub.submit(carol.id, chat("still here?")).await,
        Err(HubError::ConnectionNotFound(carol.id))
    );
}

#[tokio::test]
async fn test_presence_is_ordered_by_join_time() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    let bob = Client::connect(&hub);
    let carol = Client::connect(&hub);

    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    hub.join(carol.id, project_id, "carol".to_string()).await.unwrap();
    hub.leave(bob.id).await.unwrap();
    // Rejoining keeps nothing from the earlier membership
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();

    let last = ada
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::PresenceUpdate { data } => Some(data.users),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last, vec!["ada", "carol", "bob"]);
}

#[tokio::test]
async fn test_join_unknown_project_fails() {
    let (hub, _store, _) = memory_hub().await;
    let ada = Client::connect(&hub);

    let result = hub.join(ada.id, 999, "ada".to_string()).await;
    assert_eq!(result, Err(HubError::ProjectNotFound(999)));
    assert_eq!(hub.registry().room_of(ada.id), None);

    for _ in 0..50 {
        if hub.stats().await.active_rooms == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("room for unknown project was never removed");
}

#[tokio::test]
async fn test_empty_room_terminates_and_rehydrates() {
    let store = Arc::new(MemoryProjectStore::new());
    let project_id = store.create_project("Warehouse").await;
    let config = HubConfig {
        room_idle_timeout_secs: 1,
        ..test_config()
    };
    let hub = RoomCoordinator::spawn(store.clone(), &config);

    let mut ada = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.submit(ada.id, chat("before restart")).await.unwrap();
    hub.leave(ada.id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(hub.stats().await.active_rooms, 0);
    assert_eq!(hub.room_health(project_id).await, None);

    ada.drain();
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    let snapshot = snapshot_of(&ada.drain());
    assert_eq!(snapshot.chat.len(), 1);
    assert_eq!(snapshot.chat[0].text, "before restart");

    hub.submit(ada.id, chat("after restart")).await.unwrap();
    let stored = store.load(project_id).await.unwrap();
    assert_eq!(stored.chat[1].seq, 2);
    assert_eq!(hub.stats().await.rooms_spawned, 2);
}

/// Fails the next `failures` chat appends, then behaves normally
struct FlakyStore {
    inner: MemoryProjectStore,
    failures: AtomicUsize,
}

#[async_trait]
impl ProjectStore for FlakyStore {
    async fn load(&self, project_id: ProjectId) -> StoreResult<Project> {
        self.inner.load(project_id).await
    }

    async fn append_annotation(&self, project_id: ProjectId, annotation: &Annotation) -> StoreResult<()> {
        self.inner.append_annotation(project_id, annotation).await
    }

    async fn append_chat(&self, project_id: ProjectId, message: &ChatMessage) -> StoreResult<()> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.inner.append_chat(project_id, message).await
    }

    async fn set_transform(&self, project_id: ProjectId, transform: &TransformState) -> StoreResult<()> {
        self.inner.set_transform(project_id, transform).await
    }

    async fn set_camera(&self, project_id: ProjectId, camera: &CameraState) -> StoreResult<()> {
        self.inner.set_camera(project_id, camera).await
    }
}

#[tokio::test]
async fn test_persistence_failure_is_local_to_submitter() {
    let inner = MemoryProjectStore::new();
    let project_id = inner.create_project("Warehouse").await;
    let store = Arc::new(FlakyStore {
        inner,
        failures: AtomicUsize::new(1),
    });
    let hub = RoomCoordinator::spawn(store.clone(), &test_config());

    let mut ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    ada.drain();
    bob.drain();

    let result = hub.submit(ada.id, chat("hi")).await;
    assert!(matches!(result, Err(HubError::PersistenceFailure(_))));
    assert!(ada.drain().is_empty());
    assert!(bob.drain().is_empty());
    assert!(store.load(project_id).await.unwrap().chat.is_empty());
    assert_eq!(hub.room_health(project_id).await.unwrap().chat_messages, 0);

    hub.submit(ada.id, chat("hi again")).await.unwrap();
    match bob.drain().as_slice() {
        [ServerMessage::ChatPosted { data }] => {
            assert_eq!(data.seq, 1);
            assert_eq!(data.text, "hi again");
        }
        other => panic!("unexpected messages {:?}", other),
    }
}

/// Chat appends for one project wait until the test releases them
struct StalledStore {
    inner: MemoryProjectStore,
    stalled_project: ProjectId,
    gate: Semaphore,
}

#[async_trait]
impl ProjectStore for StalledStore {
    async fn load(&self, project_id: ProjectId) -> StoreResult<Project> {
        self.inner.load(project_id).await
    }

    async fn append_annotation(&self, project_id: ProjectId, annotation: &Annotation) -> StoreResult<()> {
        self.inner.append_annotation(project_id, annotation).await
    }

    async fn append_chat(&self, project_id: ProjectId, message: &ChatMessage) -> StoreResult<()> {
        if project_id == self.stalled_project {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            permit.forget();
        }
        self.inner.append_chat(project_id, message).await
    }

    async fn set_transform(&self, project_id: ProjectId, transform: &TransformState) -> StoreResult<()> {
        self.inner.set_transform(project_id, transform).await
    }

    async fn set_camera(&self, project_id: ProjectId, camera: &CameraState) -> StoreResult<()> {
        self.inner.set_camera(project_id, camera).await
    }
}

#[tokio::test]
async fn test_stuck_room_rejects_with_backpressure_and_spares_others() {
    let inner = MemoryProjectStore::new();
    let stuck = inner.create_project("Stuck").await;
    let healthy = inner.create_project("Healthy").await;
    let store = Arc::new(StalledStore {
        inner,
        stalled_project: stuck,
        gate: Semaphore::new(0),
    });
    let config = HubConfig {
        room_queue_depth: 2,
        ..test_config()
    };
    let hub = RoomCoordinator::spawn(store.clone(), &config);

    let ada = Client::connect(&hub);
    let bob = Client::connect(&hub);
    hub.join(ada.id, stuck, "ada".to_string()).await.unwrap();
    hub.join(bob.id, healthy, "bob".to_string()).await.unwrap();

    let submit = |text: &'static str| {
        let hub = hub.clone();
        let id = ada.id;
        tokio::spawn(async move { hub.submit(id, chat(text)).await })
    };

    let in_flight = submit("first");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let queued = vec![submit("second"), submit("third")];
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        hub.submit(ada.id, chat("fourth")).await,
        Err(HubError::RoomBackpressure { project_id: stuck })
    );
    hub.submit(bob.id, chat("unaffected")).await.unwrap();

    store.gate.add_permits(3);
    in_flight.await.unwrap().unwrap();
    for task in queued {
        task.await.unwrap().unwrap();
    }
    let texts: Vec<String> = store
        .load(stuck)
        .await
        .unwrap()
        .chat
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_leave_runs_after_mutations_already_queued() {
    let inner = MemoryProjectStore::new();
    let project_id = inner.create_project("Warehouse").await;
    let store = Arc::new(StalledStore {
        inner,
        stalled_project: project_id,
        gate: Semaphore::new(0),
    });
    let hub = RoomCoordinator::spawn(store.clone(), &test_config());

    let ada = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();

    let submit = |text: &'static str| {
        let hub = hub.clone();
        let id = ada.id;
        tokio::spawn(async move { hub.submit(id, chat(text)).await })
    };

    let first = submit("first");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = submit("second");
    tokio::time::sleep(Duration::from_millis(50)).await;
    let leave = {
        let hub = hub.clone();
        let id = ada.id;
        tokio::spawn(async move { hub.leave(id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    store.gate.add_permits(2);
    assert_eq!(first.await.unwrap(), Ok(()));
    assert_eq!(second.await.unwrap(), Ok(()));
    assert_eq!(leave.await.unwrap(), Ok(()));
    assert_eq!(
        hub.submit(ada.id, chat("after leave")).await,
        Err(HubError::NotJoined)
    );

    let chat_log = store.load(project_id).await.unwrap().chat;
    let texts: Vec<&str> = chat_log.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn test_disconnect_runs_after_mutations_already_queued() {
    let inner = MemoryProjectStore::new();
    let project_id = inner.create_project("Warehouse").await;
    let store = Arc::new(StalledStore {
        inner,
        stalled_project: project_id,
        gate: Semaphore::new(0),
    });
    let hub = RoomCoordinator::spawn(store.clone(), &test_config());

    let ada = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();

    let pending = {
        let hub = hub.clone();
        let id = ada.id;
        tokio::spawn(async move { hub.submit(id, chat("last words")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.disconnect(ada.id).await;
    store.gate.add_permits(1);

    assert_eq!(pending.await.unwrap(), Ok(()));
    let chat_log = store.load(project_id).await.unwrap().chat;
    assert_eq!(chat_log.len(), 1);
    assert_eq!(chat_log[0].author, "ada");
    assert_eq!(hub.stats().await.connections, 0);
}

#[tokio::test]
async fn test_joiner_sees_models_attached_while_room_is_live() {
    let (hub, store, project_id) = memory_hub().await;
    let ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();

    store
        .add_model(project_id, "hull", "https://cdn.example/hull.glb")
        .await
        .unwrap();

    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    let snapshot = snapshot_of(&bob.drain());
    assert_eq!(snapshot.models.len(), 1);
    assert_eq!(snapshot.models[0].name, "hull");
    assert_eq!(snapshot.models[0].url, "https://cdn.example/hull.glb");
}

#[tokio::test]
async fn test_closed_member_is_evicted_on_next_broadcast() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    let carol = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    hub.join(carol.id, project_id, "carol".to_string()).await.unwrap();
    ada.drain();
    bob.drain();

    let carol_id = carol.id;
    drop(carol);
    hub.submit(ada.id, chat("anyone there?")).await.unwrap();

    assert_eq!(ada.next_presence().await, vec!["ada", "bob"]);
    assert_eq!(bob.next_presence().await, vec!["ada", "bob"]);
    assert_eq!(hub.stats().await.connections, 2);
    assert_eq!(
        hub.submit(carol_id, chat("hello?")).await,
        Err(HubError::ConnectionNotFound(carol_id))
    );
}

#[tokio::test]
async fn test_member_that_stops_reading_is_evicted() {
    let store = Arc::new(MemoryProjectStore::new());
    let project_id = store.create_project("Warehouse").await;
    let config = HubConfig {
        outbound_buffer: 4,
        send_timeout_ms: 50,
        ..HubConfig::default()
    };
    let hub = RoomCoordinator::spawn(store, &config);

    // carol never reads: snapshot plus three presence updates fill her buffer
    let carol = Client::connect(&hub);
    let mut ada = Client::connect(&hub);
    let mut bob = Client::connect(&hub);
    hub.join(carol.id, project_id, "carol".to_string()).await.unwrap();
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    hub.join(bob.id, project_id, "bob".to_string()).await.unwrap();
    ada.drain();
    bob.drain();

    hub.submit(ada.id, chat("still with us?")).await.unwrap();

    assert_eq!(ada.next_presence().await, vec!["ada", "bob"]);
    assert_eq!(bob.next_presence().await, vec!["ada", "bob"]);
    assert_eq!(hub.stats().await.connections, 2);
    assert_eq!(hub.registry().room_of(carol.id), None);
}

#[tokio::test]
async fn test_join_with_closed_outbound_is_transport_failure() {
    let (hub, _store, project_id) = memory_hub().await;
    let mut ada = Client::connect(&hub);
    hub.join(ada.id, project_id, "ada".to_string()).await.unwrap();
    ada.drain();

    let (handle, rx) = hub.register();
    drop(rx);
    assert_eq!(
        hub.join(handle.id, project_id, "ghost".to_string()).await,
        Err(HubError::TransportFailure(handle.id))
    );
    assert_eq!(hub.registry().room_of(handle.id), None);
    assert_eq!(hub.stats().await.connections, 1);

    hub.submit(ada.id, chat("quiet in here")).await.unwrap();
    let presences: Vec<Vec<String>> = ada
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ServerMessage::PresenceUpdate { data } => Some(data.users),
            _ => None,
        })
        .collect();
    assert!(presences.iter().all(|users| users == &vec!["ada".to_string()]));
}

#[tokio::test]
async fn test_racing_joins_leave_one_consistent_presence() {
    let store = Arc::new(MemoryProjectStore::new());
    let first = store.create_project("One").await;
    let second = store.create_project("Two").await;
    let hub = RoomCoordinator::spawn(store, &test_config());

    let mut ada = Client::connect(&hub);
    let cy = Client::connect(&hub);
    hub.join(ada.id, first, "ada".to_string()).await.unwrap();
    ada.drain();

    let (a, b) = tokio::join!(
        hub.join(cy.id, first, "cy".to_string()),
        hub.join(cy.id, second, "cy".to_string())
    );
    a.unwrap();
    b.unwrap();

    let expected: Vec<String> = if hub.registry().room_of(cy.id) == Some(first) {
        vec!["ada".to_string(), "cy".to_string()]
    } else {
        vec!["ada".to_string()]
    };
    assert_eq!(hub.registry().list_members(first), expected);
    loop {
        if ada.next_presence().await == expected {
            break;
        }
    }
}
