//! Service info and health endpoints for container orchestration.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

pub async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "Second Guess",
        version: env!("CARGO_PKG_VERSION"),
        description: "Decision Quality Measurement System",
    })
}

/// Readiness probe: healthy only while the decision store answers.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.decisions.store().ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
        }
    }
}
