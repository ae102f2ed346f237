use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;

use super::ProjectStore;
use crate::database::entities::{annotations, chat_messages, project_models, projects};
use crate::errors::{StoreError, StoreResult};
use crate::scene::{
    Annotation, CameraState, ChatMessage, ModelRef, Project, ProjectId, TransformState,
};

/// SQLite-backed store. Every write runs in its own transaction together with
/// the project's `updated_at` bump, so a missing project is reported as
/// `NotFound` and nothing partial is left behind.
#[derive(Clone)]
pub struct SeaOrmProjectStore {
    db: DatabaseConnection,
}

impl SeaOrmProjectStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn touch<C: ConnectionTrait>(conn: &C, project_id: ProjectId) -> StoreResult<projects::Model> {
        let project = projects::Entity::find_by_id(project_id)
            .one(conn)
            .await?
            .ok_or(StoreError::NotFound(project_id))?;

        let active: projects::ActiveModel = project.into();
        Ok(active.set_updated_at().update(conn).await?)
    }

    async fn fetch_models(&self, project_id: ProjectId) -> StoreResult<Vec<ModelRef>> {
        let models = project_models::Entity::find()
            .filter(project_models::Column::ProjectId.eq(project_id))
            .order_by_asc(project_models::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ProjectStore for SeaOrmProjectStore {
    async fn load(&self, project_id: ProjectId) -> StoreResult<Project> {
        let project = projects::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(project_id))?;

        let models = self.fetch_models(project_id).await?;

        let annotations = annotations::Entity::find()
            .filter(annotations::Column::ProjectId.eq(project_id))
            .order_by_asc(annotations::Column::Seq)
            .all(&self.db)
            .await?;

        let chat = chat_messages::Entity::find()
            .filter(chat_messages::Column::ProjectId.eq(project_id))
            .order_by_asc(chat_messages::Column::Seq)
            .all(&self.db)
            .await?;

        let transform = match project.transform.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => TransformState::default(),
        };
        let camera = match project.camera.as_deref() {
            Some(json) => Some(serde_json::from_str(json)?),
            None => None,
        };

        debug!(
            "Loaded project {} ({} annotations, {} chat messages)",
            project_id,
            annotations.len(),
            chat.len()
        );

        Ok(Project {
            id: project.id,
            title: project.title,
            models,
            annotations: annotations.into_iter().map(Into::into).collect(),
            chat: chat.into_iter().map(Into::into).collect(),
            transform,
            camera,
        })
    }

    async fn load_models(&self, project_id: ProjectId) -> StoreResult<Vec<ModelRef>> {
        projects::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(project_id))?;
        self.fetch_models(project_id).await
    }

    async fn append_annotation(&self, project_id: ProjectId, annotation: &Annotation) -> StoreResult<()> {
        let txn = self.db.begin().await?;
        Self::touch(&txn, project_id).await?;

        annotations::ActiveModel {
            project_id: Set(project_id),
            seq: Set(annotation.seq),
            position_x: Set(annotation.position[0]),
            position_y: Set(annotation.position[1]),
            position_z: Set(annotation.position[2]),
            text: Set(annotation.text.clone()),
            author: Set(annotation.author.clone()),
            created_at: Set(annotation.at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn append_chat(&self, project_id: ProjectId, message: &ChatMessage) -> StoreResult<()> {
        let txn = self.db.begin().await?;
        Self::touch(&txn, project_id).await?;

        chat_messages::ActiveModel {
            project_id: Set(project_id),
            seq: Set(message.seq),
            author: Set(message.author.clone()),
            text: Set(message.text.clone()),
            created_at: Set(message.at),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(())
    }

    async fn set_transform(&self, project_id: ProjectId, transform: &TransformState) -> StoreResult<()> {
        let json = serde_json::to_string(transform)?;
        let project = projects::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(project_id))?;

        let mut active: projects::ActiveModel = project.into();
        active.transform = Set(Some(json));
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn set_camera(&self, project_id: ProjectId, camera: &CameraState) -> StoreResult<()> {
        let json = serde_json::to_string(camera)?;
        let project = projects::Entity::find_by_id(project_id)
            .one(&self.db)
            .await?
            .ok_or(StoreError::NotFound(project_id))?;

        let mut active: projects::ActiveModel = project.into();
        active.camera = Set(Some(json));
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }
}
