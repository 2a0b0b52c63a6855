//! HTTP routes.
//!
//! Decision API under `/api/v1/decisions`, plus service info and health at the
//! root. API responses default to `no-store`; a specific stored version is
//! immutable and marks itself cacheable.
//!
//! Every request runs inside a `request` span with a unique request id.

pub mod decisions;
pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{self, HeaderValue, CACHE_CONTROL};
use http::Method;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{HttpServerConfig, CACHE_CONTROL_NO_STORE};
use crate::middleware::request_id_layer;
use crate::state::AppState;

fn cors_layer(config: &HttpServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Creates the Axum router with all routes, cache headers and CORS.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/decisions", post(decisions::create))
        .route("/api/v1/decisions/{decision_id}", get(decisions::latest))
        .route("/api/v1/decisions/{decision_id}/versions", get(decisions::versions))
        .route(
            "/api/v1/decisions/{decision_id}/versions/{version}",
            get(decisions::version),
        )
        .route(
            "/api/v1/decisions/{decision_id}/reevaluate",
            post(decisions::reevaluate),
        )
        .route("/api/v1/decisions/{decision_id}/compare", get(decisions::compare))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        ));

    // Health check - no caching, always fresh for probes
    let service_routes = Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health));

    let cors = cors_layer(&state.config.http);

    Router::new()
        .merge(api_routes)
        .merge(service_routes)
        .with_state(state)
        .layer(cors)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
