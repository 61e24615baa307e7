use crate::domain::models::{Module, Template};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ModulePayload {
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSaved {
    template: Template,
    reports_updated: usize,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:id", put(rename_module).delete(delete_module))
        .route(
            "/:id/templates/:evaluation_type",
            get(get_template).put(put_template).delete(delete_template),
        )
        .with_state(state)
}

async fn rename_module(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ModulePayload>,
) -> Result<Json<Module>, StatusCode> {
    Ok(Json(state.workspace.rename_module(id, &payload.title).await?))
}

async fn delete_module(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state.workspace.delete_module(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_template(
    State(state): State<SharedState>,
    Path((module_id, evaluation_type)): Path<(Uuid, String)>,
) -> Result<Json<Template>, StatusCode> {
    let template = state.workspace.template(module_id, &evaluation_type).await?;
    Ok(Json(template))
}

async fn put_template(
    State(state): State<SharedState>,
    Path((module_id, evaluation_type)): Path<(Uuid, String)>,
    Json(template): Json<Template>,
) -> Result<Json<TemplateSaved>, StatusCode> {
    let (template, reports_updated) = state
        .workspace
        .replace_template(module_id, &evaluation_type, template)
        .await?;
    Ok(Json(TemplateSaved {
        template,
        reports_updated,
    }))
}

async fn delete_template(
    State(state): State<SharedState>,
    Path((module_id, evaluation_type)): Path<(Uuid, String)>,
) -> Result<StatusCode, StatusCode> {
    state
        .workspace
        .delete_template(module_id, &evaluation_type)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
