//! Handlers for the decision API.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::CACHE_CONTROL, HeaderName, StatusCode},
    Json,
};
use serde::Deserialize;
use tracing::instrument;

use crate::config::CACHE_CONTROL_VERSION;
use crate::error::AppError;
use crate::models::{DecisionInput, DecisionResponse, VersionComparison, VersionSummary};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CompareParams {
    pub v1: i64,
    pub v2: i64,
}

/// Evaluate a new decision
#[instrument(name = "decisions::create", skip_all)]
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<DecisionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<DecisionResponse>), AppError> {
    let Json(input) = payload?;
    let response = state.decisions.evaluate(input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(name = "decisions::latest", skip(state))]
pub async fn latest(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
) -> Result<Json<DecisionResponse>, AppError> {
    Ok(Json(state.decisions.latest(&decision_id).await?))
}

#[instrument(name = "decisions::versions", skip(state))]
pub async fn versions(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
) -> Result<Json<Vec<VersionSummary>>, AppError> {
    Ok(Json(state.decisions.versions(&decision_id).await?))
}

/// One stored version; immutable, so cacheable by the client
#[instrument(name = "decisions::version", skip_all)]
pub async fn version(
    State(state): State<AppState>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<([(HeaderName, &'static str); 1], Json<DecisionResponse>), AppError> {
    let Path((decision_id, version)) = path?;
    let response = state.decisions.get(&decision_id, version).await?;
    Ok(([(CACHE_CONTROL, CACHE_CONTROL_VERSION)], Json(response)))
}

/// Evaluate an existing decision again with new context
#[instrument(name = "decisions::reevaluate", skip(state, payload))]
pub async fn reevaluate(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
    payload: Result<Json<DecisionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<DecisionResponse>), AppError> {
    let Json(input) = payload?;
    let response = state.decisions.reevaluate(&decision_id, input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[instrument(name = "decisions::compare", skip(state, params))]
pub async fn compare(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
    params: Result<Query<CompareParams>, QueryRejection>,
) -> Result<Json<VersionComparison>, AppError> {
    let Query(CompareParams { v1, v2 }) = params?;
    Ok(Json(state.decisions.compare(&decision_id, v1, v2).await?))
}
