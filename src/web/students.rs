use crate::domain::models::StudentReport;
use crate::services::export::PlainTextRenderer;
use crate::services::workspace::{NewStudent, StudentFilter};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::fmt::Write as _;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct StudentQuery {
    module_id: Option<Uuid>,
    evaluation_type: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_students).post(create_student))
        .route(
            "/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/:id/export", get(export_student))
        .with_state(state)
}

async fn list_students(
    State(state): State<SharedState>,
    Query(query): Query<StudentQuery>,
) -> Json<Vec<StudentReport>> {
    let filter = StudentFilter {
        module_id: query.module_id,
        evaluation_type: query.evaluation_type.filter(|t| !t.is_empty()),
    };
    Json(state.workspace.list_students(&filter).await)
}

async fn create_student(
    State(state): State<SharedState>,
    Json(payload): Json<NewStudent>,
) -> Result<(StatusCode, Json<StudentReport>), StatusCode> {
    let report = state.workspace.create_student(payload).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn get_student(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StudentReport>, StatusCode> {
    Ok(Json(state.workspace.open_student(id).await?))
}

async fn update_student(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(report): Json<StudentReport>,
) -> Result<Json<StudentReport>, StatusCode> {
    Ok(Json(state.workspace.update_student(id, report).await?))
}

async fn delete_student(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    state.workspace.delete_student(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_student(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Response, StatusCode> {
    let renderer = PlainTextRenderer {
        generated_on: chrono::Local::now().date_naive(),
    };
    let document = state.workspace.export_student(id, &renderer).await?;
    let disposition = HeaderValue::from_str(&content_disposition(&document.filename))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(document.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response())
}

/// `attachment` header value with an ASCII fallback and an RFC 5987 name.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let mut encoded = String::new();
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
