use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::service::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    DecisionMismatch(String),

    #[error("{0}")]
    Model(String),

    #[error(transparent)]
    JsonBody(#[from] JsonRejection),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::InvalidInput(msg) => AppError::InvalidInput(msg),
            ServiceError::NotFound(msg) => AppError::NotFound(msg),
            ServiceError::DecisionMismatch { .. } => AppError::DecisionMismatch(e.to_string()),
            ServiceError::Pipeline(e) => {
                tracing::error!(stage = %e.stage, error = %e.source, "Language model failure");
                AppError::Model(format!("Evaluation failed at {}: language model error", e.stage))
            }
            ServiceError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        AppError::InvalidInput(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::InvalidInput(e.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::InvalidInput(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::DecisionMismatch(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Model(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::JsonBody(rejection) => (rejection.status(), rejection.body_text()),
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
