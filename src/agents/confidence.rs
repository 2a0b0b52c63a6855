//! Confidence Estimator: deterministic penalties and the final recommendation.
//!
//! No model call happens here. Penalties are applied in a fixed order so the
//! same agent outputs always produce the same adjusted confidence.

use crate::models::{
    ClaimSource, ConfidenceOutput, ConfidencePenalty, ContextAnalysis, DevilsAdvocateOutput,
    JudgeOutput, ProposerOutput, RiskLevel, Severity,
};

use super::truncate_chars;

/// Adjusted confidence below this delays the decision
const DELAY_BELOW: u8 = 40;
/// Adjusted confidence below this (and at least `DELAY_BELOW`) is conditional
const CONDITIONAL_BELOW: u8 = 70;

const UNSUPPORTED_CLAIM_PENALTY: u8 = 8;
const FLAGGED_ASSUMPTION_PENALTY: u8 = 12;
const HIGH_RISK_ASSUMPTION_PENALTY: u8 = 6;
const WEAK_CLAIM_PENALTY: u8 = 5;
const CRITICAL_EXECUTION_PENALTY: u8 = 15;
const HIGH_EXECUTION_PENALTY: u8 = 8;

const MAX_BLOCKERS: usize = 5;
const MAX_MONITORING_ITEMS: usize = 4;

/// Final call derived from adjusted confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Delay,
    Conditional,
    Proceed,
}

impl Verdict {
    pub fn from_confidence(adjusted: u8) -> Self {
        if adjusted < DELAY_BELOW {
            Verdict::Delay
        } else if adjusted < CONDITIONAL_BELOW {
            Verdict::Conditional
        } else {
            Verdict::Proceed
        }
    }

    /// Heading that opens the final recommendation text
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Delay => "DELAY",
            Verdict::Conditional => "CONDITIONAL PROCEED",
            Verdict::Proceed => "PROCEED",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConfidenceEstimator;

impl ConfidenceEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(
        &self,
        analysis: &ContextAnalysis,
        proposal: &ProposerOutput,
        critique: &DevilsAdvocateOutput,
        judgement: &JudgeOutput,
    ) -> ConfidenceOutput {
        let mut penalties = Vec::new();
        missing_context_penalties(analysis, &mut penalties);
        unsupported_claim_penalties(judgement, &mut penalties);
        high_risk_assumption_penalties(proposal, critique, &mut penalties);
        weak_claim_penalties(judgement, &mut penalties);
        execution_risk_penalty(critique, &mut penalties);

        let initial = i32::from(proposal.confidence);
        let total: i32 = penalties.iter().map(|p| i32::from(p.percentage_impact)).sum();
        let adjusted = (initial - total).clamp(0, 100);

        tracing::info!(
            initial_confidence = initial,
            adjusted_confidence = adjusted,
            penalties = penalties.len(),
            "Confidence adjusted"
        );

        ConfidenceOutput {
            initial_confidence: proposal.confidence,
            adjusted_confidence: adjusted as u8,
            delta: adjusted - initial,
            penalties,
            improvements: Vec::new(),
        }
    }

    /// Render the DELAY / CONDITIONAL PROCEED / PROCEED text with next steps
    pub fn final_recommendation(
        &self,
        confidence: &ConfidenceOutput,
        proposal: &ProposerOutput,
        critique: &DevilsAdvocateOutput,
        analysis: &ContextAnalysis,
    ) -> String {
        let adjusted = confidence.adjusted_confidence;
        match Verdict::from_confidence(adjusted) {
            Verdict::Delay => delay_text(adjusted, proposal, critique, analysis),
            Verdict::Conditional => conditional_text(adjusted, proposal, critique, analysis),
            Verdict::Proceed => proceed_text(adjusted, proposal, critique),
        }
    }
}

fn penalty(reason: String, percentage_impact: u8) -> ConfidencePenalty {
    ConfidencePenalty {
        reason,
        percentage_impact,
    }
}

fn missing_context_penalties(analysis: &ContextAnalysis, out: &mut Vec<ConfidencePenalty>) {
    let per_item = match analysis.completeness_score {
        0..=29 => 20,
        30..=49 => 15,
        _ => 10,
    };
    out.extend(
        analysis
            .missing_context
            .iter()
            .map(|item| penalty(format!("Missing critical context: {}", item), per_item)),
    );
}

fn unsupported_claim_penalties(judgement: &JudgeOutput, out: &mut Vec<ConfidencePenalty>) {
    out.extend(
        judgement
            .unsupported_claims
            .iter()
            .filter(|c| c.source == ClaimSource::Proposer)
            .map(|c| {
                penalty(
                    format!(
                        "Unsupported claim: {}... (missing: {}...)",
                        truncate_chars(&c.claim, 60),
                        truncate_chars(&c.missing_evidence, 40)
                    ),
                    UNSUPPORTED_CLAIM_PENALTY,
                )
            }),
    );
}

fn high_risk_assumption_penalties(
    proposal: &ProposerOutput,
    critique: &DevilsAdvocateOutput,
    out: &mut Vec<ConfidencePenalty>,
) {
    for assumption in proposal
        .assumptions
        .iter()
        .filter(|a| a.risk_level == RiskLevel::High)
    {
        let statement = assumption.statement.to_lowercase();
        let flagged = critique
            .high_risk_assumptions
            .iter()
            .any(|flag| flag.to_lowercase().contains(&statement));
        let short = truncate_chars(&assumption.statement, 60);

        out.push(if flagged {
            penalty(
                format!("High-risk unverified assumption: {}...", short),
                FLAGGED_ASSUMPTION_PENALTY,
            )
        } else {
            penalty(
                format!("High-risk assumption: {}...", short),
                HIGH_RISK_ASSUMPTION_PENALTY,
            )
        });
    }
}

fn weak_claim_penalties(judgement: &JudgeOutput, out: &mut Vec<ConfidencePenalty>) {
    out.extend(
        judgement
            .weak_claims
            .iter()
            .filter(|c| c.source == ClaimSource::Proposer)
            .map(|c| {
                penalty(
                    format!(
                        "Weak/vague claim: {}... ({}...)",
                        truncate_chars(&c.claim, 60),
                        truncate_chars(&c.weakness_reason, 40)
                    ),
                    WEAK_CLAIM_PENALTY,
                )
            }),
    );
}

fn execution_risk_penalty(critique: &DevilsAdvocateOutput, out: &mut Vec<ConfidencePenalty>) {
    let execution = critique.risk_breakdown.execution;
    if execution >= 8 {
        out.push(penalty(
            format!("Critical execution risk level ({}/10)", execution),
            CRITICAL_EXECUTION_PENALTY,
        ));
    } else if execution >= 6 {
        out.push(penalty(
            format!("High execution risk level ({}/10)", execution),
            HIGH_EXECUTION_PENALTY,
        ));
    }
}

fn high_risk_statements(proposal: &ProposerOutput) -> impl Iterator<Item = &str> {
    proposal
        .assumptions
        .iter()
        .filter(|a| a.risk_level == RiskLevel::High)
        .map(|a| a.statement.as_str())
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn delay_text(
    adjusted: u8,
    proposal: &ProposerOutput,
    critique: &DevilsAdvocateOutput,
    analysis: &ContextAnalysis,
) -> String {
    let mut blockers: Vec<String> = analysis
        .missing_context
        .iter()
        .take(3)
        .map(|m| format!("Gather missing context: {}", m))
        .collect();
    blockers.extend(
        high_risk_statements(proposal)
            .take(2)
            .map(|s| format!("Verify assumption: {}", s)),
    );
    blockers.extend(
        critique
            .failure_scenarios
            .iter()
            .filter(|fs| fs.impact_severity == Severity::Critical)
            .take(2)
            .map(|fs| format!("Mitigate risk: {}", fs.description)),
    );
    blockers.truncate(MAX_BLOCKERS);

    format!(
        "DELAY\n\n\
         Adjusted confidence ({}%) is too low to proceed. Address these blockers first:\n\n\
         {}\n\n\
         Once these blockers are resolved, re-evaluate the decision with updated context.",
        adjusted,
        bullets(&blockers)
    )
}

fn conditional_text(
    adjusted: u8,
    proposal: &ProposerOutput,
    critique: &DevilsAdvocateOutput,
    analysis: &ContextAnalysis,
) -> String {
    let mut requirements = Vec::new();
    if !analysis.missing_context.is_empty() {
        let first_two: Vec<&str> = analysis
            .missing_context
            .iter()
            .take(2)
            .map(String::as_str)
            .collect();
        requirements.push(format!("Obtain {}", first_two.join(", ")));
    }
    if let Some(statement) = high_risk_statements(proposal).next() {
        requirements.push(format!(
            "Validate assumptions: {}...",
            truncate_chars(statement, 50)
        ));
    }
    if let Some(scenario) = critique
        .failure_scenarios
        .iter()
        .find(|fs| matches!(fs.impact_severity, Severity::High | Severity::Critical))
    {
        requirements.push(format!(
            "Prepare mitigation for: {}...",
            truncate_chars(&scenario.description, 50)
        ));
    }

    format!(
        "CONDITIONAL PROCEED\n\n\
         Adjusted confidence ({}%) suggests proceeding with caution. Required conditions:\n\n\
         {}\n\n\
         Monitor execution closely and be prepared to rollback if issues arise.",
        adjusted,
        bullets(&requirements)
    )
}

fn proceed_text(adjusted: u8, proposal: &ProposerOutput, critique: &DevilsAdvocateOutput) -> String {
    let mut monitoring = Vec::new();
    if let Some(assumption) = proposal
        .assumptions
        .iter()
        .find(|a| a.risk_level == RiskLevel::Medium)
    {
        monitoring.push(format!(
            "Monitor assumption: {}...",
            truncate_chars(&assumption.statement, 60)
        ));
    }
    if let Some(scenario) = critique.failure_scenarios.first() {
        monitoring.push(format!(
            "Watch for: {}...",
            truncate_chars(&scenario.description, 60)
        ));
    }
    let risks = &critique.risk_breakdown;
    if risks.execution >= 5 {
        monitoring.push(format!(
            "Monitor execution closely (risk: {}/10)",
            risks.execution
        ));
    }
    if risks.reputational >= 6 {
        monitoring.push(format!(
            "Monitor public perception (risk: {}/10)",
            risks.reputational
        ));
    }
    monitoring.truncate(MAX_MONITORING_ITEMS);

    if monitoring.is_empty() {
        return format!(
            "PROCEED\n\n\
             Adjusted confidence ({}%) strongly supports moving forward. No significant monitoring requirements identified.",
            adjusted
        );
    }

    format!(
        "PROCEED\n\n\
         Adjusted confidence ({}%) supports moving forward. Recommended monitoring:\n\n\
         {}\n\n\
         Confidence is high, but stay vigilant for early warning signs.",
        adjusted,
        bullets(&monitoring)
    )
}
