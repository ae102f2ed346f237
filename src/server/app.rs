use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{health, projects};
use super::websocket::websocket_handler;
use crate::collaboration::CoordinatorHandle;
use crate::config::HubConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub coordinator: CoordinatorHandle,
    pub hub_config: Arc<HubConfig>,
}

pub fn create_app(
    db: DatabaseConnection,
    coordinator: CoordinatorHandle,
    hub_config: HubConfig,
    cors_origin: Option<&str>,
) -> Result<Router> {
    let state = AppState {
        db,
        coordinator,
        hub_config: Arc::new(hub_config),
    };

    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {}", origin))?,
            )
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ws/rooms", get(websocket_handler))
        .nest("/api/v1", api_v1_routes())
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state);

    Ok(app)
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route("/projects/:id", get(projects::get_project))
        .route("/projects/:id/models", post(projects::add_model))
}
