pub mod app;
pub mod handlers;
pub mod websocket;

use anyhow::{Context, Result};
use clap::Subcommand;
use sea_orm_migration::prelude::*;
use std::sync::Arc;
use tracing::info;

use crate::collaboration::RoomCoordinator;
use crate::config::ServerConfig;
use crate::database::{connection::*, migrations::Migrator};
use crate::store::SeaOrmProjectStore;

#[derive(Subcommand, Debug)]
pub enum MigrateDirection {
    Up,
    Down,
    Fresh,
}

pub async fn start_server(config: ServerConfig) -> Result<()> {
    config.hub.validate()?;

    let database_url = get_database_url(Some(&config.database));
    let db = setup_database(&database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database))?;
    info!("Database migrations completed");

    let store = Arc::new(SeaOrmProjectStore::new(db.clone()));
    let coordinator = RoomCoordinator::spawn(store, &config.hub);

    let app = app::create_app(
        db,
        coordinator.clone(),
        config.hub.clone(),
        config.cors_origin.as_deref(),
    )?;

    log_routes();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server running on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping rooms");
    coordinator.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn log_routes() {
    info!("API Endpoints:");
    info!("  /health                     - Health check and hub statistics");
    info!("  /api/v1/projects            - Project CRUD and model references");
    info!("  /ws/rooms                   - Real-time rooms (WebSocket)");
}

pub async fn migrate_database(database_path: &str, direction: MigrateDirection) -> Result<()> {
    let database_url = get_database_url(Some(database_path));
    let db = establish_connection(&database_url).await?;

    match direction {
        MigrateDirection::Up => {
            info!("Running migrations up");
            Migrator::up(&db, None).await?;
        }
        MigrateDirection::Down => {
            info!("Running migrations down");
            Migrator::down(&db, None).await?;
        }
        MigrateDirection::Fresh => {
            info!("Running fresh migrations (down then up)");
            Migrator::down(&db, None).await?;
            Migrator::up(&db, None).await?;
        }
    }

    info!("Database migration completed");
    Ok(())
}
