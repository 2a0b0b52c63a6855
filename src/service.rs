//! Decision service: evaluation, versioning and comparison.
//!
//! Every evaluation is stored as a new immutable version. Stored versions are
//! served through an in-memory cache since they never change.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::models::{
    DecisionInput, DecisionResponse, DecisionRun, DecisionType, RiskDelta, VersionComparison,
    VersionSummary,
};
use crate::pipeline::{Evaluation, Pipeline, PipelineError};
use crate::store::{DecisionStore, StoreError};

/// Hex characters of randomness appended to decision ids
const DECISION_ID_SUFFIX_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Decision statement must match original. Expected: '{expected}', Got: '{got}'")]
    DecisionMismatch { expected: String, got: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `dec_<YYYYMMDD>_<type>_<HHMMSS>_<hex>`
pub fn generate_decision_id(decision_type: DecisionType, at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "dec_{}_{}_{}_{}",
        at.format("%Y%m%d"),
        decision_type,
        at.format("%H%M%S"),
        &suffix[..DECISION_ID_SUFFIX_LEN]
    )
}

pub struct DecisionService {
    pipeline: Pipeline,
    store: DecisionStore,
    versions: Cache<(String, i64), Arc<DecisionRun>>,
    /// Serializes version allocation and insert
    write_lock: Mutex<()>,
}

impl DecisionService {
    pub fn new(pipeline: Pipeline, store: DecisionStore, cache_config: &CacheConfig) -> Self {
        let versions = Cache::builder()
            .max_capacity(cache_config.max_versions)
            .time_to_live(Duration::from_secs(cache_config.version_ttl_seconds))
            .build();

        Self {
            pipeline,
            store,
            versions,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &DecisionStore {
        &self.store
    }

    /// Evaluate a new decision, stored as version 1
    #[instrument(skip_all)]
    pub async fn evaluate(&self, input: DecisionInput) -> Result<DecisionResponse, ServiceError> {
        validate(&input)?;

        let evaluation = self.pipeline.run(&input.decision, input.context_str()).await?;
        let timestamp = Utc::now();
        let decision_id = generate_decision_id(evaluation.context_analysis.decision_type, timestamp);

        let run = {
            let _guard = self.write_lock.lock().await;
            self.persist(&input, decision_id, 1, timestamp, evaluation).await?
        };

        tracing::info!(decision_id = %run.decision_id, "Decision evaluated");
        Ok(run.into())
    }

    /// Evaluate an existing decision again with new context.
    ///
    /// The pipeline starts fresh; earlier versions only supply the id and the
    /// statement that must be repeated unchanged.
    #[instrument(skip_all, fields(decision_id = %decision_id))]
    pub async fn reevaluate(
        &self,
        decision_id: &str,
        input: DecisionInput,
    ) -> Result<DecisionResponse, ServiceError> {
        validate(&input)?;

        let latest = self
            .store
            .latest(decision_id)
            .await?
            .ok_or_else(|| not_found(decision_id))?;
        if latest.decision != input.decision {
            return Err(ServiceError::DecisionMismatch {
                expected: latest.decision,
                got: input.decision,
            });
        }

        let evaluation = self.pipeline.run(&input.decision, input.context_str()).await?;

        let run = {
            let _guard = self.write_lock.lock().await;
            let version = self.store.next_version(decision_id).await?;
            self.persist(&input, decision_id.to_string(), version, Utc::now(), evaluation)
                .await?
        };

        tracing::info!(version = run.version, "Decision re-evaluated");
        Ok(run.into())
    }

    async fn persist(
        &self,
        input: &DecisionInput,
        decision_id: String,
        version: i64,
        timestamp: DateTime<Utc>,
        evaluation: Evaluation,
    ) -> Result<DecisionRun, ServiceError> {
        let trace_id = evaluation.trace_id();
        let trace = evaluation.trace;
        let run = DecisionRun {
            decision_id,
            version,
            timestamp,
            decision: input.decision.clone(),
            context_provided: input.context.clone(),
            context_analysis: evaluation.context_analysis,
            proposer_output: evaluation.proposer_output,
            devils_advocate_output: evaluation.devils_advocate_output,
            judge_output: evaluation.judge_output,
            confidence_output: evaluation.confidence_output,
            final_recommendation: evaluation.final_recommendation,
            trace_id,
        };

        self.store.insert(input, &run).await?;

        if let Some(trace) = trace {
            trace.update(
                json!({
                    "adjusted_confidence": run.confidence_output.adjusted_confidence,
                    "final_recommendation": run.final_recommendation,
                }),
                json!({ "decision_id": run.decision_id, "version": run.version }),
            );
            trace.flush_in_background();
        }

        self.versions
            .insert((run.decision_id.clone(), run.version), Arc::new(run.clone()))
            .await;
        Ok(run)
    }

    #[instrument(skip(self), fields(cache_hit = false, duration_ms))]
    pub async fn get(&self, decision_id: &str, version: i64) -> Result<DecisionResponse, ServiceError> {
        let start = Instant::now();
        let key = (decision_id.to_string(), version);

        if let Some(run) = self.versions.get(&key).await {
            tracing::Span::current().record("cache_hit", true);
            tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
            return Ok(run.as_ref().clone().into());
        }

        let run = self.store.get(decision_id, version).await?.ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Decision {} version {} not found",
                decision_id, version
            ))
        })?;
        self.versions.insert(key, Arc::new(run.clone())).await;

        tracing::Span::current().record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(run.into())
    }

    pub async fn latest(&self, decision_id: &str) -> Result<DecisionResponse, ServiceError> {
        let run = self
            .store
            .latest(decision_id)
            .await?
            .ok_or_else(|| not_found(decision_id))?;
        Ok(run.into())
    }

    /// Summaries of all versions, oldest first
    pub async fn versions(&self, decision_id: &str) -> Result<Vec<VersionSummary>, ServiceError> {
        let runs = self.store.list(decision_id).await?;
        if runs.is_empty() {
            return Err(not_found(decision_id));
        }
        Ok(runs.iter().map(VersionSummary::from).collect())
    }

    pub async fn compare(
        &self,
        decision_id: &str,
        v1: i64,
        v2: i64,
    ) -> Result<VersionComparison, ServiceError> {
        let first = self.get(decision_id, v1).await?.run;
        let second = self.get(decision_id, v2).await?.run;
        Ok(compare_runs(&first, &second))
    }
}

fn not_found(decision_id: &str) -> ServiceError {
    ServiceError::NotFound(format!("Decision {} not found", decision_id))
}

fn validate(input: &DecisionInput) -> Result<(), ServiceError> {
    if input.decision.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "decision must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Deltas are `second - first`
pub fn compare_runs(first: &DecisionRun, second: &DecisionRun) -> VersionComparison {
    let before = &first.context_analysis.missing_context;
    let after = &second.context_analysis.missing_context;

    VersionComparison {
        decision_id: first.decision_id.clone(),
        v1: first.version,
        v2: second.version,
        context_completeness_delta: i32::from(second.context_analysis.completeness_score)
            - i32::from(first.context_analysis.completeness_score),
        confidence_delta: i32::from(second.confidence_output.adjusted_confidence)
            - i32::from(first.confidence_output.adjusted_confidence),
        risk_reduction: RiskDelta::between(
            &first.devils_advocate_output.risk_breakdown,
            &second.devils_advocate_output.risk_breakdown,
        ),
        resolved_missing_context: before.iter().filter(|m| !after.contains(m)).cloned().collect(),
        remaining_missing_context: before.iter().filter(|m| after.contains(m)).cloned().collect(),
        new_missing_context: after.iter().filter(|m| !before.contains(m)).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::llm::testing::ScriptedModel;
    use crate::observability::testing::{config, events, spawn_ingestion, wait_for_batch};
    use crate::observability::Langfuse;
    use crate::store::fixtures::run;
    use axum::http::StatusCode;
    use chrono::TimeZone;

    async fn service_with(model: Arc<ScriptedModel>) -> DecisionService {
        let store = DecisionStore::open_in_memory().await.unwrap();
        DecisionService::new(Pipeline::new(model, 0, None), store, &CacheConfig::default())
    }

    #[test]
    fn test_decision_id_format() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 5).unwrap();
        let id = generate_decision_id(DecisionType::MarketEntry, at);
        assert!(id.starts_with("dec_20250115_market_entry_093005_"), "{}", id);

        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_decision_id(DecisionType::MarketEntry, at));
    }

    #[test]
    fn test_compare_runs() {
        let mut first = run("dec_a", 1, &["rollback plan", "monitoring", "load test"], 40);
        first.context_analysis.completeness_score = 25;
        let mut second = run("dec_a", 2, &["monitoring", "on-call rota"], 72);
        second.context_analysis.completeness_score = 60;
        second.devils_advocate_output.risk_breakdown.execution = 3;

        let cmp = compare_runs(&first, &second);
        assert_eq!((cmp.v1, cmp.v2), (1, 2));
        assert_eq!(cmp.context_completeness_delta, 35);
        assert_eq!(cmp.confidence_delta, 32);
        assert_eq!(cmp.risk_reduction.execution, -3);
        assert_eq!(cmp.risk_reduction.reputational, 0);
        assert_eq!(cmp.resolved_missing_context, vec!["rollback plan", "load test"]);
        assert_eq!(cmp.remaining_missing_context, vec!["monitoring"]);
        assert_eq!(cmp.new_missing_context, vec!["on-call rota"]);
    }

    #[tokio::test]
    async fn test_blank_decision_is_rejected_before_any_model_call() {
        let model = Arc::new(ScriptedModel::default());
        let service = service_with(model.clone()).await;

        let err = service.evaluate(DecisionInput::new("   ", None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_lookups_of_unknown_decision() {
        let service = service_with(Arc::new(ScriptedModel::default())).await;

        assert!(matches!(service.latest("dec_x").await, Err(ServiceError::NotFound(_))));
        assert!(matches!(service.versions("dec_x").await, Err(ServiceError::NotFound(_))));
        let err = service.get("dec_x", 3).await.unwrap_err();
        assert_eq!(err.to_string(), "Decision dec_x version 3 not found");

        let err = service
            .reevaluate("dec_x", DecisionInput::new("Launch?", Some("ready")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Decision dec_x not found");
    }

    #[tokio::test]
    async fn test_reevaluate_requires_same_statement() {
        let service = service_with(Arc::new(ScriptedModel::default())).await;
        let original = run("dec_a", 1, &[], 50);
        service
            .store()
            .insert(&DecisionInput::new(original.decision.clone(), None), &original)
            .await
            .unwrap();

        let err = service
            .reevaluate("dec_a", DecisionInput::new("Launch the old checkout flow", None))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Decision statement must match original. Expected: 'Launch the new checkout flow'"));
    }

    #[tokio::test]
    async fn test_get_serves_stored_versions_through_cache() {
        let service = service_with(Arc::new(ScriptedModel::default())).await;
        let stored = run("dec_a", 1, &["rollback plan"], 45);
        service
            .store()
            .insert(&DecisionInput::new(stored.decision.clone(), None), &stored)
            .await
            .unwrap();

        let first = service.get("dec_a", 1).await.unwrap();
        let second = service.get("dec_a", 1).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.risk_breakdown, stored.devils_advocate_output.risk_breakdown);
        assert!(service.versions.get(&("dec_a".to_string(), 1)).await.is_some());
    }

    #[tokio::test]
    async fn test_evaluation_is_linked_to_its_langfuse_trace() {
        let (host, batches) = spawn_ingestion(StatusCode::OK).await;
        let langfuse = Langfuse::from_config(&config(host)).unwrap();
        let model = Arc::new(ScriptedModel::new([
            "hiring",
            r#"{"recommendation": "delay", "assumptions": [], "confidence": 50,
                "justification": "No budget figures."}"#,
            r#"{"counterarguments": ["a", "b", "c", "d"], "failure_scenarios": [],
                "high_risk_assumptions": [],
                "risk_breakdown": {"execution": 5, "market_customer": 3, "reputational": 2, "opportunity_cost": 6}}"#,
            r#"{"proposer_strength": 4, "advocate_strength": 6, "weak_claims": [],
                "unsupported_claims": [], "reasoning_assessment": "Thin on both sides."}"#,
        ]));
        let store = DecisionStore::open_in_memory().await.unwrap();
        let service = DecisionService::new(
            Pipeline::new(model, 0, Some(langfuse)),
            store,
            &CacheConfig::default(),
        );

        let response = service
            .evaluate(DecisionInput::new("Hire two more engineers?", None))
            .await
            .unwrap();
        let trace_id = response.run.trace_id.clone().expect("trace id");

        let stored = service
            .store()
            .get(&response.run.decision_id, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.trace_id.as_deref(), Some(trace_id.as_str()));

        // Persisting finalizes the trace and flushes it
        wait_for_batch(&batches).await;
        let events = events(&batches);
        let update = events.last().unwrap();
        assert_eq!(update["type"], "trace-create");
        assert_eq!(update["body"]["id"], trace_id.as_str());
        assert_eq!(
            update["body"]["metadata"]["decision_id"],
            response.run.decision_id.as_str()
        );
        assert_eq!(update["body"]["metadata"]["version"], 1);
    }
}
