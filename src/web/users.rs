use crate::domain::models::User;
use crate::services::workspace::NewUser;
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

/// Returned once on creation; the token is never listed again.
#[derive(Debug, Serialize)]
struct CreatedUser {
    id: Uuid,
    name: String,
    email: String,
    token: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", delete(delete_user))
        .with_state(state)
}

async fn list_users(State(state): State<SharedState>) -> Json<Vec<User>> {
    Json(state.workspace.users().await)
}

async fn create_user(
    State(state): State<SharedState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<CreatedUser>), StatusCode> {
    let user = state.workspace.create_user(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedUser {
            id: user.id,
            name: user.name,
            email: user.email,
            token: user.token,
        }),
    ))
}

async fn delete_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state.workspace.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
