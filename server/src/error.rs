//! Request-level errors and their JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use plant_disease::PlantDiseaseError;

pub const NO_IMAGE_MESSAGE: &str = "No image provided. Send JSON with imageUrl or upload image file";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", NO_IMAGE_MESSAGE)]
    NoImage,

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Failed to download image from URL: {0}")]
    Download(String),

    #[error("Invalid base64 image data: {0}")]
    InvalidBase64(String),

    #[error(transparent)]
    Processing(#[from] PlantDiseaseError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoImage | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the client
    pub fn message(&self) -> String {
        match self.status() {
            StatusCode::BAD_REQUEST => self.to_string(),
            _ => format!("Error processing image: {}", self),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();

        if status.is_server_error() {
            error!("{}", message);
        }

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_split() {
        assert_eq!(ApiError::NoImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Download("timeout".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Processing(PlantDiseaseError::ImageDecode("bad".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(ApiError::NoImage.message(), NO_IMAGE_MESSAGE);
        assert_eq!(
            ApiError::Download("connection refused".into()).message(),
            "Error processing image: Failed to download image from URL: connection refused"
        );
    }
}
