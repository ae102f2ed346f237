use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use tokio::sync::RwLock;

use super::ProjectStore;
use crate::errors::{StoreError, StoreResult};
use crate::scene::{Annotation, CameraState, ChatMessage, ModelRef, Project, ProjectId, TransformState};

/// Process-local store, for embedding and tests
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
    next_id: AtomicI32,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_project(&self, title: &str) -> ProjectId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.projects
            .write()
            .await
            .insert(id, Project::new(id, title));
        id
    }

    pub async fn add_model(&self, project_id: ProjectId, name: &str, url: &str) -> StoreResult<ModelRef> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(StoreError::NotFound(project_id))?;
        let model = ModelRef {
            id: project.models.len() as i32 + 1,
            name: name.to_string(),
            url: url.to_string(),
        };
        project.models.push(model.clone());
        Ok(model)
    }

    async fn with_project<F>(&self, project_id: ProjectId, apply: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Project),
    {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&project_id)
            .ok_or(StoreError::NotFound(project_id))?;
        apply(project);
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn load(&self, project_id: ProjectId) -> StoreResult<Project> {
        self.projects
            .read()
            .await
            .get(&project_id)
            .cloned()
            .ok_or(StoreError::NotFound(project_id))
    }

    async fn append_annotation(&self, project_id: ProjectId, annotation: &Annotation) -> StoreResult<()> {
        self.with_project(project_id, |p| p.annotations.push(annotation.clone()))
            .await
    }

    async fn append_chat(&self, project_id: ProjectId, message: &ChatMessage) -> StoreResult<()> {
        self.with_project(project_id, |p| p.chat.push(message.clone()))
            .await
    }

    async fn set_transform(&self, project_id: ProjectId, transform: &TransformState) -> StoreResult<()> {
        self.with_project(project_id, |p| p.transform = transform.clone())
            .await
    }

    async fn set_camera(&self, project_id: ProjectId, camera: &CameraState) -> StoreResult<()> {
        self.with_project(project_id, |p| p.camera = Some(camera.clone()))
            .await
    }
}
