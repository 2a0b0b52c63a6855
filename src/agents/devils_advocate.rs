//! Devil's Advocate: attacks the recommendation across four risk dimensions.

use std::sync::Arc;

use tracing::instrument;

use crate::llm::{complete_structured, ChatMessage, ChatModel, LlmError, StructuredOutput, TokenUsage};
use crate::models::{ContextAnalysis, DevilsAdvocateOutput, ProposerOutput};

use super::{bullet_list, context_or_placeholder};

const MAX_RISK: u8 = 10;

const SYSTEM_PROMPT: &str = "You are a Devil's Advocate agent that systematically challenges recommendations.

Rules:
- Attack the recommendation across all four dimensions: Execution Risk, Market & Customer Impact, Reputational Downside, Opportunity Cost.
- Give specific counterarguments, not generic concerns.
- Describe concrete failure scenarios with clear triggers.
- Flag unverified assumptions as high-risk.
- Score each dimension 0-10 from context completeness and assumption quality; lower completeness means higher execution risk.
- Do not soften the critique with phrases such as \"however\", \"on the other hand\" or \"to be fair\".";

impl StructuredOutput for DevilsAdvocateOutput {
    fn validate(&self) -> Result<(), String> {
        let risks = &self.risk_breakdown;
        for (dimension, score) in [
            ("execution", risks.execution),
            ("market_customer", risks.market_customer),
            ("reputational", risks.reputational),
            ("opportunity_cost", risks.opportunity_cost),
        ] {
            if score > MAX_RISK {
                return Err(format!("risk_breakdown.{} must be 0-10, got {}", dimension, score));
            }
        }
        Ok(())
    }
}

pub struct DevilsAdvocate {
    model: Arc<dyn ChatModel>,
    max_retries: u32,
}

impl DevilsAdvocate {
    pub fn new(model: Arc<dyn ChatModel>, max_retries: u32) -> Self {
        Self { model, max_retries }
    }

    #[instrument(name = "devils_advocate", skip_all)]
    pub async fn critique(
        &self,
        decision: &str,
        context: &str,
        analysis: &ContextAnalysis,
        proposal: &ProposerOutput,
    ) -> Result<(DevilsAdvocateOutput, Option<TokenUsage>), LlmError> {
        let messages = vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(build_prompt(decision, context, analysis, proposal)),
        ];
        let (output, usage) = complete_structured::<DevilsAdvocateOutput>(
            self.model.as_ref(),
            "devils_advocate",
            messages,
            self.max_retries,
        )
        .await?;

        tracing::info!(
            counterarguments = output.counterarguments.len(),
            failure_scenarios = output.failure_scenarios.len(),
            high_risk_assumptions = output.high_risk_assumptions.len(),
            execution_risk = output.risk_breakdown.execution,
            "Critique produced"
        );
        Ok((output, usage))
    }
}

/// "statement (basis: ..., risk: ...)" lines for the proposer's assumptions
pub(super) fn assumption_lines(proposal: &ProposerOutput) -> String {
    bullet_list(proposal.assumptions.iter().map(|a| {
        format!("{} (basis: {}, risk: {})", a.statement, a.basis, a.risk_level)
    }))
}

fn build_prompt(
    decision: &str,
    context: &str,
    analysis: &ContextAnalysis,
    proposal: &ProposerOutput,
) -> String {
    format!(
        "Systematically challenge this recommendation across ALL FOUR attack dimensions.

DECISION:
{decision}

PROVIDED CONTEXT:
{context}

CONTEXT COMPLETENESS: {score}/100

MISSING CONTEXT:
{missing}

PROPOSER'S RECOMMENDATION:
{recommendation}

PROPOSER'S CONFIDENCE: {confidence}/100

PROPOSER'S ASSUMPTIONS:
{assumptions}

PROPOSER'S JUSTIFICATION:
{justification}

ATTACK DIMENSIONS:
1. EXECUTION RISK (0-10): technical failure modes, dependency and integration failures, timing problems. Score higher when completeness is below 50.
2. MARKET & CUSTOMER IMPACT (0-10): customer segments at risk, competitive dynamics, erosion of customer trust.
3. REPUTATIONAL DOWNSIDE (0-10): how a public failure would be framed and what it would do to the brand.
4. OPPORTUNITY COST (0-10): ignored alternatives, cost of delaying other priorities, resource trade-offs.

REQUIRED OUTPUT:
- counterarguments: at least one per dimension (four or more), each directly challenging the Proposer
- failure_scenarios: at least three specific scenarios with a trigger and an impact severity (low, medium, high or critical)
- high_risk_assumptions: Proposer assumptions that are unverified or high-risk, quoting the statement
- risk_breakdown: all four dimensions scored 0-10",
        decision = decision,
        context = context_or_placeholder(context),
        score = analysis.completeness_score,
        missing = bullet_list(&analysis.missing_context),
        recommendation = proposal.recommendation,
        confidence = proposal.confidence,
        assumptions = assumption_lines(proposal),
        justification = proposal.justification,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::fixtures;
    use crate::llm::testing::ScriptedModel;
    use crate::models::{RiskLevel, Severity};

    const REPLY: &str = r#"{
        "counterarguments": ["No load test", "Customers churn", "Press coverage", "Delays roadmap"],
        "failure_scenarios": [
            {"description": "Checkout outage", "trigger": "Traffic spike", "impact_severity": "critical"},
            {"description": "Rollback stalls", "trigger": "Schema change", "impact_severity": "high"},
            {"description": "Support backlog", "trigger": "Confusing UI", "impact_severity": "medium"}
        ],
        "high_risk_assumptions": ["Rollback can be done manually (UNVERIFIED)"],
        "risk_breakdown": {"execution": 8, "market_customer": 6, "reputational": 5, "opportunity_cost": 3}
    }"#;

    #[test]
    fn test_prompt_includes_proposal() {
        let analysis = fixtures::analysis(&["rollback plan"], &[], 0);
        let proposal = fixtures::proposal(
            65,
            vec![fixtures::assumption("Traffic stays flat", RiskLevel::Medium)],
        );

        let prompt = build_prompt("Launch?", "", &analysis, &proposal);
        assert!(prompt.contains("CONTEXT COMPLETENESS: 0/100"));
        assert!(prompt.contains("MISSING CONTEXT:\n  - rollback plan"));
        assert!(prompt.contains("PROPOSER'S CONFIDENCE: 65/100"));
        assert!(prompt.contains("  - Traffic stays flat (basis: Assumed, risk: medium)"));
    }

    #[tokio::test]
    async fn test_critique_parses_structured_reply() {
        let model = Arc::new(ScriptedModel::new([REPLY]));
        let analysis = fixtures::analysis(&["rollback plan"], &[], 0);
        let proposal = fixtures::proposal(60, vec![]);

        let (output, _) = DevilsAdvocate::new(model.clone(), 2)
            .critique("Launch?", "", &analysis, &proposal)
            .await
            .unwrap();

        assert_eq!(output.counterarguments.len(), 4);
        assert_eq!(output.failure_scenarios[0].impact_severity, Severity::Critical);
        assert_eq!(output.risk_breakdown.execution, 8);
        assert_eq!(model.requests()[0].name, "devils_advocate");
    }

    #[tokio::test]
    async fn test_risk_above_ten_is_rejected() {
        let bad = REPLY.replace("\"execution\": 8", "\"execution\": 12");
        let model = Arc::new(ScriptedModel::new([bad.as_str(), bad.as_str()]));
        let analysis = fixtures::analysis(&[], &[], 100);
        let proposal = fixtures::proposal(60, vec![]);

        let err = DevilsAdvocate::new(model, 1)
            .critique("Launch?", "", &analysis, &proposal)
            .await
            .unwrap_err();

        match err {
            LlmError::InvalidResponse { attempts, message } => {
                assert_eq!(attempts, 2);
                assert!(message.contains("risk_breakdown.execution"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
