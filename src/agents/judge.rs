//! Judge: scores the reasoning quality of both sides.

use std::sync::Arc;

use tracing::instrument;

use crate::llm::{complete_structured, ChatMessage, ChatModel, LlmError, StructuredOutput, TokenUsage};
use crate::models::{ContextAnalysis, DevilsAdvocateOutput, JudgeOutput, ProposerOutput};

use super::devils_advocate::assumption_lines;
use super::{bullet_list, context_or_placeholder};

const MAX_STRENGTH: u8 = 10;

const SYSTEM_PROMPT: &str = "You are a Judge agent that evaluates reasoning quality neutrally.

Rules:
- Evaluate both the Proposer and the Devil's Advocate.
- Do not favor either side for its conclusion; judge logic, specificity and evidence.
- Score strength 0-10 on logical consistency, specificity over vagueness, support from the provided context, and absence of overconfidence.
- Weak claims are vague (\"things could go wrong\"); specific claims name the mechanism (\"auth service could fail under load\").
- Unsupported claims are those not backed by the provided context.";

impl StructuredOutput for JudgeOutput {
    fn validate(&self) -> Result<(), String> {
        if self.proposer_strength > MAX_STRENGTH {
            return Err(format!("proposer_strength must be 0-10, got {}", self.proposer_strength));
        }
        if self.advocate_strength > MAX_STRENGTH {
            return Err(format!("advocate_strength must be 0-10, got {}", self.advocate_strength));
        }
        Ok(())
    }
}

pub struct Judge {
    model: Arc<dyn ChatModel>,
    max_retries: u32,
}

impl Judge {
    pub fn new(model: Arc<dyn ChatModel>, max_retries: u32) -> Self {
        Self { model, max_retries }
    }

    #[instrument(name = "judge", skip_all)]
    pub async fn evaluate(
        &self,
        decision: &str,
        context: &str,
        analysis: &ContextAnalysis,
        proposal: &ProposerOutput,
        critique: &DevilsAdvocateOutput,
    ) -> Result<(JudgeOutput, Option<TokenUsage>), LlmError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(decision, context, analysis, proposal, critique)),
        ];
        let (output, usage) =
            complete_structured::<JudgeOutput>(self.model.as_ref(), "judge", messages, self.max_retries)
                .await?;

        tracing::info!(
            proposer_strength = output.proposer_strength,
            advocate_strength = output.advocate_strength,
            weak_claims = output.weak_claims.len(),
            unsupported_claims = output.unsupported_claims.len(),
            "Reasoning judged"
        );
        Ok((output, usage))
    }
}

fn build_prompt(
    decision: &str,
    context: &str,
    analysis: &ContextAnalysis,
    proposal: &ProposerOutput,
    critique: &DevilsAdvocateOutput,
) -> String {
    let scenarios = bullet_list(critique.failure_scenarios.iter().map(|fs| {
        format!(
            "{} (trigger: {}, severity: {})",
            fs.description, fs.trigger, fs.impact_severity
        )
    }));
    let risks = &critique.risk_breakdown;

    format!(
        "Evaluate the reasoning quality of BOTH the Proposer and the Devil's Advocate.

DECISION:
{decision}

PROVIDED CONTEXT:
{context}

CONTEXT AVAILABLE:
{available}

CONTEXT COMPLETENESS: {score}/100

---

PROPOSER'S CASE:
Recommendation: {recommendation}
Confidence: {confidence}/100

Assumptions:
{assumptions}

Justification:
{justification}

---

DEVIL'S ADVOCATE'S CASE:
Counterarguments:
{counterarguments}

Failure Scenarios:
{scenarios}

High-Risk Assumptions Flagged:
{high_risk}

Risk Breakdown:
- Execution: {execution}/10
- Market & Customer: {market}/10
- Reputational: {reputational}/10
- Opportunity Cost: {opportunity}/10

---

Given a completeness of {score}%, check whether each side's confidence is justified; low context (below 50) with high confidence (above 70) is a red flag.

OUTPUT:
- proposer_strength and advocate_strength: 0-10
- weak_claims: vague or poorly reasoned claims from either side, each with source \"proposer\" or \"advocate\" (at least one when completeness is below 50)
- unsupported_claims: claims not backed by the provided context, each with source and the missing evidence
- reasoning_assessment: two or three sentences on the reasoning of both sides",
        decision = decision,
        context = context_or_placeholder(context),
        available = bullet_list(&analysis.provided_context),
        score = analysis.completeness_score,
        recommendation = proposal.recommendation,
        confidence = proposal.confidence,
        assumptions = assumption_lines(proposal),
        justification = proposal.justification,
        counterarguments = bullet_list(&critique.counterarguments),
        scenarios = scenarios,
        high_risk = bullet_list(&critique.high_risk_assumptions),
        execution = risks.execution,
        market = risks.market_customer,
        reputational = risks.reputational,
        opportunity = risks.opportunity_cost,
    )
}
