use crate::services::workspace::WorkspaceService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<WorkspaceService>,
}

pub type SharedState = Arc<AppState>;
