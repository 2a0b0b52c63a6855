//! Proposer: produces a recommendation with explicit assumptions.

use std::sync::Arc;

use tracing::instrument;

use crate::llm::{complete_structured, ChatMessage, ChatModel, LlmError, StructuredOutput, TokenUsage};
use crate::models::{ContextAnalysis, ProposerOutput};

use super::{bullet_list, context_or_placeholder};

const SYSTEM_PROMPT: &str = "You are an evaluation agent that produces recommendations from the provided context ONLY.

Rules:
- Base the recommendation strictly on the provided context.
- State every assumption explicitly, with its basis and the risk if it is wrong.
- Never ask clarifying questions.
- Avoid conversational phrasing such as \"It seems like\" or \"I think\"; use evaluative phrasing such as \"Given provided context\".
- Be directive: recommend \"proceed\", \"delay\" or \"conditional: <conditions>\".
- Tie confidence to context completeness.";

impl StructuredOutput for ProposerOutput {
    fn validate(&self) -> Result<(), String> {
        if self.confidence > 100 {
            return Err(format!("confidence must be 0-100, got {}", self.confidence));
        }
        if self.recommendation.trim().is_empty() {
            return Err("recommendation must not be empty".to_string());
        }
        Ok(())
    }
}

pub struct Proposer {
    model: Arc<dyn ChatModel>,
    max_retries: u32,
}

impl Proposer {
    pub fn new(model: Arc<dyn ChatModel>, max_retries: u32) -> Self {
        Self { model, max_retries }
    }

    #[instrument(name = "proposer", skip_all)]
    pub async fn propose(
        &self,
        decision: &str,
        context: &str,
        analysis: &ContextAnalysis,
    ) -> Result<(ProposerOutput, Option<TokenUsage>), LlmError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(decision, context, analysis)),
        ];
        let (output, usage) =
            complete_structured::<ProposerOutput>(self.model.as_ref(), "proposer", messages, self.max_retries)
                .await?;

        tracing::info!(
            recommendation = %output.recommendation,
            confidence = output.confidence,
            assumptions = output.assumptions.len(),
            "Recommendation proposed"
        );
        Ok((output, usage))
    }
}

fn build_prompt(decision: &str, context: &str, analysis: &ContextAnalysis) -> String {
    format!(
        "Evaluate this decision and recommend a course of action using ONLY the provided context.

DECISION:
{decision}

PROVIDED CONTEXT:
{context}

CONTEXT ANALYSIS:
- Decision Type: {decision_type}
- Completeness Score: {score}/100

CONTEXT AVAILABLE:
{available}

CONTEXT MISSING:
{missing}

INSTRUCTIONS:
1. Recommend \"proceed\", \"delay\" or \"conditional: [specific conditions]\".
2. List ALL assumptions you rely on (at least 2 when any context is missing), each with its basis and a risk level (low, medium or high).
3. Assign a confidence from 0 to 100 based on completeness and assumption risk. Completeness below 50 calls for several assumptions and lower confidence; above 80 may need few assumptions.
4. Justify the recommendation from the available context only.",
        decision = decision,
        context = context_or_placeholder(context),
        decision_type = analysis.decision_type,
        score = analysis.completeness_score,
        available = bullet_list(&analysis.provided_context),
        missing = bullet_list(&analysis.missing_context),
    )
}
