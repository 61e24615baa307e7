mod config;
mod db;
mod domain;
mod services;
mod state;
mod web;

use crate::config::{AppConfig, StorageBackend};
use crate::db::memory::MemoryStore;
use crate::db::postgres::PgStore;
use crate::db::{seed, Store};
use crate::domain::defaults::TemplateDefaults;
use crate::services::workspace::WorkspaceService;
use crate::state::{AppState, SharedState};
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => Arc::new(PgStore::connect(&config).await.map_err(|e| {
            tracing::error!("Failed to open database: {}", e);
            e
        })?),
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, nothing will survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let defaults = TemplateDefaults::new(config.seed_school_years.clone());
    seed::seed_all(store.as_ref(), &defaults.seed_school_years).await?;

    let workspace = WorkspaceService::load(store, defaults).await?;

    let shared: SharedState = Arc::new(AppState {
        workspace: Arc::new(workspace),
    });

    let app = Router::new()
        .merge(web::routes(shared))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
