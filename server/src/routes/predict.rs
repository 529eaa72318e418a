//! Prediction endpoint

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use plant_disease::inference::Prediction;

use crate::acquire::ImageSource;
use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct ClassConfidence {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub prediction: String,
    pub confidence: f64,
    pub confidence_percentage: f64,
    pub class_index: usize,
    /// Every class, in output-index order
    pub all_predictions: Vec<ClassConfidence>,
    pub inference_time_ms: f64,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        let confidence = prediction.confidence as f64;
        let all_predictions = prediction
            .probabilities
            .into_iter()
            .map(|p| ClassConfidence {
                class_name: p.class_name,
                confidence: p.probability as f64,
                percentage: p.probability as f64 * 100.0,
            })
            .collect();

        Self {
            success: true,
            prediction: prediction.class_name,
            confidence,
            confidence_percentage: confidence * 100.0,
            class_index: prediction.class_index,
            all_predictions,
            inference_time_ms: prediction.inference_time_ms,
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Find the image source of a request, if it has one
async fn read_source(request: Request) -> Result<Option<ImageSource>, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if is_json(&content_type) {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        // An unparseable body is the client's fault: 400, not the 500 used
        // for failures once an image source is known
        let value: Value =
            serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Ok(ImageSource::from_json(&value))
    } else if content_type.to_ascii_lowercase().starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        ImageSource::from_multipart(multipart).await
    } else {
        Ok(None)
    }
}

/// POST /api/predict - Classify one image
pub async fn predict(
    State(state): State<SharedState>,
    request: Request,
) -> Result<Json<PredictResponse>, ApiError> {
    let source = read_source(request).await?.ok_or(ApiError::NoImage)?;
    info!("Received image: {}", source.describe());

    let bytes = source.into_bytes(&state.http).await?;

    let predictor = state.predictor()?;
    let prediction = tokio::task::spawn_blocking(move || predictor.predict_bytes(&bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("Inference task failed: {}", e)))??;

    info!(
        "Prediction: {} ({:.2}%) in {:.1} ms",
        prediction.class_name,
        prediction.confidence * 100.0,
        prediction.inference_time_ms
    );

    Ok(Json(PredictResponse::from(prediction)))
}
