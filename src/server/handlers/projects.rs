use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::scene::{ModelRef, Project, ProjectId};
use crate::server::app::AppState;
use crate::services::{ProjectService, ProjectSummary};

#[derive(Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
}

#[derive(Serialize, Deserialize)]
pub struct AddModelRequest {
    pub name: String,
    pub url: String,
}

fn internal_error(err: anyhow::Error) -> StatusCode {
    error!("Project request failed: {:#}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProjectSummary>>, StatusCode> {
    let projects = ProjectService::new(state.db)
        .list_projects()
        .await
        .map_err(internal_error)?;

    Ok(Json(projects))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectSummary>), StatusCode> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let project = ProjectService::new(state.db)
        .create_project(title)
        .await
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> Result<Json<Project>, StatusCode> {
    ProjectService::new(state.db)
        .get_project(id)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn add_model(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(payload): Json<AddModelRequest>,
) -> Result<(StatusCode, Json<ModelRef>), StatusCode> {
    if payload.name.trim().is_empty() || payload.url.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let model = ProjectService::new(state.db)
        .add_model(id, payload.name.trim(), payload.url.trim())
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok((StatusCode::CREATED, Json(model)))
}
