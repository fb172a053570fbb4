use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use plate_recognition::RecognitionError;
use serde_json::json;
use thiserror::Error;
use vehicle_registry::RegistryError;

pub const NO_DETECTION_MESSAGE: &str = "No license plates detected with sufficient confidence. \
                                        Please ensure the plate is clearly visible and try again.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone()),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<RecognitionError> for ApiError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::InvalidImage(msg) => ApiError::bad_request(msg),
            RecognitionError::NoDetection => {
                ApiError::Unprocessable(NO_DETECTION_MESSAGE.to_string())
            }
            RecognitionError::Timeout(_) => {
                ApiError::ServiceUnavailable(format!("{}; please retry", err))
            }
            RecognitionError::ModelInvocation { .. } => {
                tracing::error!(error = ?err, "recognition failed");
                ApiError::internal(format!("Error processing image: {}", err))
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(msg) => ApiError::bad_request(msg),
            RegistryError::DuplicatePlate(_) => {
                ApiError::Conflict("Vehicle already registered".to_string())
            }
            RegistryError::Storage(_) => {
                tracing::error!(error = ?err, "registry storage failure");
                ApiError::internal(format!("Error registering vehicle: {}", err))
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        // Body limit violations surface while reading fields
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(err.body_text());
        }
        ApiError::bad_request(format!("invalid multipart body: {}", err.body_text()))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err.to_string())
    }
}
