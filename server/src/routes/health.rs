//! Service info and health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct IndexResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub model: &'static str,
    pub classes: Vec<String>,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model_loaded: bool,
    pub device: &'static str,
    pub model_type: &'static str,
    pub num_classes: usize,
    pub uptime_seconds: u64,
}

/// GET / - Service description
pub async fn index(State(state): State<SharedState>) -> Json<IndexResponse> {
    Json(IndexResponse {
        status: "online",
        message: "Plant Disease Detection API",
        model: "MobileNetV2",
        classes: state.class_names.clone(),
        version: "1.0",
    })
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: true,
        device: state.device,
        model_type: "MobileNetV2",
        num_classes: state.num_classes,
        uptime_seconds: state.uptime_seconds(),
    })
}
