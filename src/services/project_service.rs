use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::database::entities::{project_models, projects, projects::Entity as Projects};
use crate::errors::StoreError;
use crate::scene::{ModelRef, Project, ProjectId};
use crate::store::{ProjectStore, SeaOrmProjectStore};

/// Listing entry for a project, without its annotation and chat logs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<projects::Model> for ProjectSummary {
    fn from(model: projects::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Project CRUD outside the live rooms. Rooms only ever append to a project,
/// so creating projects and attaching model references happen here.
pub struct ProjectService {
    db: DatabaseConnection,
}

impl ProjectService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create_project(&self, title: &str) -> Result<ProjectSummary> {
        let mut project = projects::ActiveModel::new();
        project.title = Set(title.to_string());

        let project = project
            .insert(&self.db)
            .await
            .context("Failed to insert project")?;

        info!("Created project {} ({})", project.id, project.title);
        Ok(project.into())
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let projects = Projects::find()
            .order_by_asc(projects::Column::Id)
            .all(&self.db)
            .await?;

        Ok(projects.into_iter().map(Into::into).collect())
    }

    /// Full persisted document, or `None` if the project does not exist
    pub async fn get_project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        let store = SeaOrmProjectStore::new(self.db.clone());
        match store.load(project_id).await {
            Ok(project) => Ok(Some(project)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Attach a model reference. Returns `None` if the project does not exist.
    pub async fn add_model(
        &self,
        project_id: ProjectId,
        name: &str,
        url: &str,
    ) -> Result<Option<ModelRef>> {
        if Projects::find_by_id(project_id).one(&self.db).await?.is_none() {
            return Ok(None);
        }

        let model = project_models::ActiveModel {
            project_id: Set(project_id),
            name: Set(name.to_string()),
            url: Set(url.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .with_context(|| format!("Failed to attach model to project {}", project_id))?;

        info!("Attached model {} to project {}", model.name, project_id);
        Ok(Some(model.into()))
    }
}
