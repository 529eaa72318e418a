//! Class listing endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct ClassesResponse {
    pub success: bool,
    pub classes: Vec<String>,
    pub num_classes: usize,
}

/// GET /api/classes - Class names in output-index order
pub async fn list_classes(State(state): State<SharedState>) -> Json<ClassesResponse> {
    Json(ClassesResponse {
        success: true,
        classes: state.class_names.clone(),
        num_classes: state.class_names.len(),
    })
}
