//! The persistent project store the hub writes through.
//!
//! Room actors are the only writers of the annotation log, chat log, transform
//! and camera of a project while its room is active. The CRUD layer
//! ([`crate::services::ProjectService`]) may read those fields at any time but
//! must not write them while a room for the project is running; this is not
//! enforced in-process.

mod database;
mod memory;

pub use database::SeaOrmProjectStore;
pub use memory::MemoryProjectStore;

use async_trait::async_trait;

use crate::errors::StoreResult;
use crate::scene::{
    Annotation, CameraState, ChatMessage, ModelRef, Project, ProjectId, TransformState,
};

/// Each call is atomic at the single-field / single-entry level.
#[async_trait]
pub trait ProjectStore: Send + Sync + 'static {
    /// Full document, or `StoreError::NotFound`
    async fn load(&self, project_id: ProjectId) -> StoreResult<Project>;

    /// Model references only. These are written by the CRUD layer even while
    /// a room is live, so rooms re-read them instead of trusting their copy.
    async fn load_models(&self, project_id: ProjectId) -> StoreResult<Vec<ModelRef>> {
        Ok(self.load(project_id).await?.models)
    }

    async fn append_annotation(&self, project_id: ProjectId, annotation: &Annotation)
        -> StoreResult<()>;

    async fn append_chat(&self, project_id: ProjectId, message: &ChatMessage) -> StoreResult<()>;

    /// Overwrites the stored transform wholesale
    async fn set_transform(&self, project_id: ProjectId, transform: &TransformState)
        -> StoreResult<()>;

    async fn set_camera(&self, project_id: ProjectId, camera: &CameraState) -> StoreResult<()>;
}
