//! Sequential evaluation pipeline.
//!
//! Runs Context Analyzer, Proposer, Devil's Advocate, Judge and Confidence
//! Estimator in order, each stage consuming the outputs before it. Any stage
//! failure aborts the run.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::agents::{ConfidenceEstimator, ContextAnalyzer, DevilsAdvocate, Judge, Proposer};
use crate::llm::{ChatModel, LlmError, TokenUsage};
use crate::models::{
    ConfidenceOutput, ContextAnalysis, DevilsAdvocateOutput, JudgeOutput, ProposerOutput,
};
use crate::observability::{Langfuse, Trace};

const TRACE_NAME: &str = "decision_evaluation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ContextAnalyzer,
    Proposer,
    DevilsAdvocate,
    Judge,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ContextAnalyzer => "context_analyzer",
            Stage::Proposer => "proposer",
            Stage::DevilsAdvocate => "devils_advocate",
            Stage::Judge => "judge",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: LlmError,
}

/// Outputs of one full pipeline run
pub struct Evaluation {
    pub context_analysis: ContextAnalysis,
    pub proposer_output: ProposerOutput,
    pub devils_advocate_output: DevilsAdvocateOutput,
    pub judge_output: JudgeOutput,
    pub confidence_output: ConfidenceOutput,
    pub final_recommendation: String,
    /// Langfuse trace for this run, still to be finalized and flushed
    pub trace: Option<Trace>,
}

impl Evaluation {
    pub fn trace_id(&self) -> Option<String> {
        self.trace.as_ref().map(|t| t.id().to_string())
    }
}

pub struct Pipeline {
    analyzer: ContextAnalyzer,
    proposer: Proposer,
    advocate: DevilsAdvocate,
    judge: Judge,
    estimator: ConfidenceEstimator,
    langfuse: Option<Langfuse>,
    model_name: String,
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn usage_metadata(model: &str, usage: Option<TokenUsage>) -> Value {
    json!({ "model": model, "usage": usage })
}

impl Pipeline {
    pub fn new(model: Arc<dyn ChatModel>, max_retries: u32, langfuse: Option<Langfuse>) -> Self {
        Self {
            model_name: model.model_name().to_string(),
            analyzer: ContextAnalyzer::new(model.clone()),
            proposer: Proposer::new(model.clone(), max_retries),
            advocate: DevilsAdvocate::new(model.clone(), max_retries),
            judge: Judge::new(model, max_retries),
            estimator: ConfidenceEstimator::new(),
            langfuse,
        }
    }

    #[instrument(name = "pipeline", skip_all)]
    pub async fn run(&self, decision: &str, context: &str) -> Result<Evaluation, PipelineError> {
        let trace = self
            .langfuse
            .as_ref()
            .map(|lf| lf.trace(TRACE_NAME, json!({ "decision": decision, "context": context })));

        match self.run_stages(decision, context, trace.as_ref()).await {
            Ok(mut evaluation) => {
                if let Some(trace) = &trace {
                    record_scores(trace, &evaluation);
                }
                evaluation.trace = trace;
                Ok(evaluation)
            }
            Err(e) => {
                tracing::warn!(stage = %e.stage, error = %e.source, "Evaluation pipeline failed");
                if let Some(trace) = &trace {
                    trace.update(
                        json!({ "error": e.to_string() }),
                        json!({ "failed_stage": e.stage.as_str() }),
                    );
                    trace.flush_in_background();
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        decision: &str,
        context: &str,
        trace: Option<&Trace>,
    ) -> Result<Evaluation, PipelineError> {
        let input = json!({ "decision": decision, "context": context });

        let started = Utc::now();
        let context_analysis = self
            .analyzer
            .analyze(decision, context)
            .await
            .map_err(|source| PipelineError {
                stage: Stage::ContextAnalyzer,
                source,
            })?;
        if let Some(trace) = trace {
            trace.span(
                Stage::ContextAnalyzer.as_str(),
                started,
                input.clone(),
                to_value(&context_analysis),
                json!({ "model": self.model_name }),
            );
        }

        let started = Utc::now();
        let (proposer_output, usage) = self
            .proposer
            .propose(decision, context, &context_analysis)
            .await
            .map_err(|source| PipelineError {
                stage: Stage::Proposer,
                source,
            })?;
        if let Some(trace) = trace {
            trace.span(
                Stage::Proposer.as_str(),
                started,
                json!({ "decision": decision, "completeness_score": context_analysis.completeness_score }),
                to_value(&proposer_output),
                usage_metadata(&self.model_name, usage),
            );
        }

        let started = Utc::now();
        let (devils_advocate_output, usage) = self
            .advocate
            .critique(decision, context, &context_analysis, &proposer_output)
            .await
            .map_err(|source| PipelineError {
                stage: Stage::DevilsAdvocate,
                source,
            })?;
        if let Some(trace) = trace {
            trace.span(
                Stage::DevilsAdvocate.as_str(),
                started,
                json!({ "recommendation": proposer_output.recommendation }),
                to_value(&devils_advocate_output),
                usage_metadata(&self.model_name, usage),
            );
        }

        let started = Utc::now();
        let (judge_output, usage) = self
            .judge
            .evaluate(
                decision,
                context,
                &context_analysis,
                &proposer_output,
                &devils_advocate_output,
            )
            .await
            .map_err(|source| PipelineError {
                stage: Stage::Judge,
                source,
            })?;
        if let Some(trace) = trace {
            trace.span(
                Stage::Judge.as_str(),
                started,
                Value::Null,
                to_value(&judge_output),
                usage_metadata(&self.model_name, usage),
            );
        }

        let started = Utc::now();
        let confidence_output = self.estimator.estimate(
            &context_analysis,
            &proposer_output,
            &devils_advocate_output,
            &judge_output,
        );
        let final_recommendation = self.estimator.final_recommendation(
            &confidence_output,
            &proposer_output,
            &devils_advocate_output,
            &context_analysis,
        );
        if let Some(trace) = trace {
            trace.span(
                "confidence_estimator",
                started,
                Value::Null,
                json!({
                    "confidence": confidence_output,
                    "final_recommendation": final_recommendation,
                }),
                Value::Null,
            );
        }

        tracing::info!(
            decision_type = %context_analysis.decision_type,
            adjusted_confidence = confidence_output.adjusted_confidence,
            "Evaluation complete"
        );

        Ok(Evaluation {
            context_analysis,
            proposer_output,
            devils_advocate_output,
            judge_output,
            confidence_output,
            final_recommendation,
            trace: None,
        })
    }
}

fn record_scores(trace: &Trace, evaluation: &Evaluation) {
    let confidence = &evaluation.confidence_output;
    trace.score(
        "context_completeness",
        f64::from(evaluation.context_analysis.completeness_score),
    );
    trace.score("initial_confidence", f64::from(confidence.initial_confidence));
    trace.score("adjusted_confidence", f64::from(confidence.adjusted_confidence));
    trace.score("confidence_delta", f64::from(confidence.delta));
    trace.score(
        "proposer_strength",
        f64::from(evaluation.judge_output.proposer_strength),
    );
    trace.score(
        "advocate_strength",
        f64::from(evaluation.judge_output.advocate_strength),
    );
}
