//! Shared fixtures for integration tests.
//!
//! `StubModel` answers each agent call with canned output keyed on the request
//! name, so the full pipeline runs without a network. `test_app` wires it into
//! the real router over an in-memory SQLite store.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use second_guess::config::{AppConfig, CacheConfig};
use second_guess::llm::{ChatCompletion, ChatModel, ChatRequest, LlmError, TokenUsage};
use second_guess::pipeline::Pipeline;
use second_guess::routes::create_router;
use second_guess::service::DecisionService;
use second_guess::state::AppState;
use second_guess::store::DecisionStore;

pub const LAUNCH_DECISION: &str = "Should we deploy the new microservice to production?";

pub const LAUNCH_CONTEXT: &str =
    "All tests passing. Load tests completed. Rollback plan ready. Team trained.";

/// Dimensions the stub reports as addressed whenever context is given
pub const ADDRESSED: [&str; 2] = ["deployment readiness", "rollback plan"];

/// Chat model returning fixed agent output
pub struct StubModel {
    failing_call: Mutex<Option<&'static str>>,
    calls: Mutex<Vec<&'static str>>,
}

impl StubModel {
    pub fn new() -> Self {
        Self {
            failing_call: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make every request with this name fail with a 500
    pub fn fail_on(&self, name: &'static str) {
        *self.failing_call.lock().unwrap() = Some(name);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(request: &ChatRequest) -> String {
        let prompt = request.last_user_message().unwrap_or_default();
        let without_context = prompt.contains("No context provided");

        match request.name {
            "context_analyzer.classify" => "Launch.".to_string(),
            "context_analyzer.extract" => json!(ADDRESSED).to_string(),
            "proposer" => json!({
                "recommendation": "Proceed with a staged rollout behind a feature flag",
                "assumptions": [
                    {
                        "statement": "Monitoring will catch regressions quickly",
                        "basis": "Existing dashboards cover the service",
                        "risk_level": "medium"
                    },
                    {
                        "statement": "Downstream consumers tolerate the new API",
                        "basis": "Contract tests pass",
                        "risk_level": "low"
                    }
                ],
                "confidence": 90,
                "justification": "Test coverage and a rollback plan reduce the blast radius."
            })
            .to_string(),
            "devils_advocate" => json!({
                "counterarguments": [
                    "Load tests may not reflect production traffic",
                    "Customers may notice latency changes",
                    "A public outage would be attributed to the migration",
                    "The team could be working on the billing backlog instead"
                ],
                "failure_scenarios": [
                    {
                        "description": "Connection pool exhaustion under peak load",
                        "trigger": "Traffic spike after a marketing email",
                        "impact_severity": "high"
                    },
                    {
                        "description": "Schema drift breaks a downstream consumer",
                        "trigger": "Unversioned field rename",
                        "impact_severity": "medium"
                    },
                    {
                        "description": "Rollback leaves queues half drained",
                        "trigger": "Partial deploy failure",
                        "impact_severity": "low"
                    }
                ],
                "high_risk_assumptions": [],
                "risk_breakdown": {
                    "execution": if without_context { 5 } else { 3 },
                    "market_customer": 4,
                    "reputational": if without_context { 5 } else { 4 },
                    "opportunity_cost": 2
                }
            })
            .to_string(),
            "judge" => json!({
                "proposer_strength": 6,
                "advocate_strength": 7,
                "weak_claims": [],
                "unsupported_claims": [],
                "reasoning_assessment": "The advocate grounds its risks more concretely."
            })
            .to_string(),
            other => format!("unexpected call {}", other),
        }
    }
}

impl Default for StubModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for StubModel {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        self.calls.lock().unwrap().push(request.name);

        if *self.failing_call.lock().unwrap() == Some(request.name) {
            return Err(LlmError::Status {
                status: 500,
                body: "upstream unavailable".to_string(),
            });
        }

        Ok(ChatCompletion {
            content: Self::reply(request),
            usage: Some(TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            }),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::from_toml_str(
        r#"
[http]
host = "127.0.0.1"
port = 0

[database]
in_memory = true
"#,
    )
    .unwrap()
}

pub async fn test_service(model: Arc<StubModel>) -> DecisionService {
    let store = DecisionStore::open_in_memory().await.unwrap();
    let pipeline = Pipeline::new(model, 0, None);
    DecisionService::new(pipeline, store, &CacheConfig::default())
}

/// Router over an in-memory store, plus the stub driving it
pub async fn test_app() -> (Router, Arc<StubModel>) {
    let model = Arc::new(StubModel::new());
    let service = test_service(model.clone()).await;
    let app = create_router(AppState::new(test_config(), service));
    (app, model)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a decision through the API and return its id
pub async fn create_decision(app: &Router, context: Option<&str>) -> String {
    let mut body = json!({ "decision": LAUNCH_DECISION });
    if let Some(context) = context {
        body["context"] = json!(context);
    }
    let response = send(app, post_json("/api/v1/decisions", &body)).await;
    assert_eq!(response.status(), 201);
    json_body(response).await["decision_id"]
        .as_str()
        .unwrap()
        .to_string()
}
