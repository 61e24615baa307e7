pub mod modules;
pub mod school_years;
pub mod students;
pub mod users;

use crate::db::StoreError;
use crate::services::workspace::WorkspaceError;
use crate::state::SharedState;
use axum::{extract::State, http::StatusCode, routing::get, Router};

async fn health(State(state): State<SharedState>) -> &'static str {
    if state.workspace.is_read_only() {
        "READ_ONLY"
    } else {
        "OK"
    }
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/school-years", school_years::router(state.clone()))
        .nest("/modules", modules::router(state.clone()))
        .nest("/students", students::router(state.clone()))
        .nest("/users", users::router(state))
}

impl From<WorkspaceError> for StatusCode {
    fn from(err: WorkspaceError) -> Self {
        match err {
            WorkspaceError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkspaceError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkspaceError::ReadOnly(_) => {
                tracing::warn!("Write refused: {}", err);
                StatusCode::SERVICE_UNAVAILABLE
            }
            WorkspaceError::Conflict(_) | WorkspaceError::Store(StoreError::Constraint { .. }) => {
                tracing::warn!("Request rejected: {}", err);
                StatusCode::CONFLICT
            }
            other => {
                tracing::error!("Request failed: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
