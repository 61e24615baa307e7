use crate::domain::models::{Module, SchoolYear};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct SchoolYearPayload {
    label: String,
}

#[derive(Debug, Deserialize)]
struct ModulePayload {
    title: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_school_years).post(create_school_year))
        .route("/:id", put(rename_school_year).delete(delete_school_year))
        .route("/:id/modules", post(create_module))
        .with_state(state)
}

async fn list_school_years(State(state): State<SharedState>) -> Json<Vec<SchoolYear>> {
    Json(state.workspace.school_years().await)
}

async fn create_school_year(
    State(state): State<SharedState>,
    Json(payload): Json<SchoolYearPayload>,
) -> Result<(StatusCode, Json<SchoolYear>), StatusCode> {
    let year = state.workspace.create_school_year(&payload.label).await?;
    Ok((StatusCode::CREATED, Json(year)))
}

async fn rename_school_year(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SchoolYearPayload>,
) -> Result<Json<SchoolYear>, StatusCode> {
    Ok(Json(state.workspace.rename_school_year(id, &payload.label).await?))
}

async fn delete_school_year(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state.workspace.delete_school_year(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_module(
    State(state): State<SharedState>,
    Path(school_year_id): Path<Uuid>,
    Json(payload): Json<ModulePayload>,
) -> Result<(StatusCode, Json<Module>), StatusCode> {
    let module = state
        .workspace
        .create_module(school_year_id, &payload.title)
        .await?;
    Ok((StatusCode::CREATED, Json(module)))
}
