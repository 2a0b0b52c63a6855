//! Data types for decision evaluation.
//!
//! Agent outputs derive `JsonSchema` so the chat model can be asked for output
//! in exactly this shape. Enumerations serialize lowercase to match the API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A decision submitted for evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInput {
    /// The decision statement to evaluate
    pub decision: String,
    /// Optional context provided by the user
    #[serde(default)]
    pub context: Option<String>,
}

impl DecisionInput {
    pub fn new(decision: impl Into<String>, context: Option<&str>) -> Self {
        Self {
            decision: decision.into(),
            context: context.map(str::to_string),
        }
    }

    /// Context as a plain string, empty when none was given
    pub fn context_str(&self) -> &str {
        self.context.as_deref().unwrap_or("")
    }
}

/// Category of decision, which determines the context it requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Launch,
    Pricing,
    Hiring,
    Technical,
    MarketEntry,
}

impl DecisionType {
    pub const ALL: [DecisionType; 5] = [
        DecisionType::Launch,
        DecisionType::Pricing,
        DecisionType::Hiring,
        DecisionType::Technical,
        DecisionType::MarketEntry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Launch => "launch",
            DecisionType::Pricing => "pricing",
            DecisionType::Hiring => "hiring",
            DecisionType::Technical => "technical",
            DecisionType::MarketEntry => "market_entry",
        }
    }

    /// Context dimensions a well-founded decision of this type needs
    pub fn required_context(&self) -> &'static [&'static str] {
        match self {
            DecisionType::Launch => &[
                "deployment readiness",
                "rollback plan",
                "system stability verification",
                "customer impact analysis",
                "team capacity and availability",
                "monitoring and alerting setup",
            ],
            DecisionType::Pricing => &[
                "competitive analysis",
                "cost structure",
                "target customer segment",
                "revenue impact model",
                "customer churn risk assessment",
                "market positioning strategy",
            ],
            DecisionType::Hiring => &[
                "current team capacity",
                "budget and runway",
                "role requirements and urgency",
                "onboarding capacity",
                "hiring timeline",
                "team growth impact",
            ],
            DecisionType::Technical => &[
                "technical requirements",
                "implementation complexity",
                "technical debt implications",
                "resource requirements",
                "testing strategy",
                "rollback and failure recovery",
            ],
            DecisionType::MarketEntry => &[
                "market size and opportunity",
                "competitive landscape",
                "customer acquisition strategy",
                "resource requirements",
                "timeline and milestones",
                "risk assessment",
            ],
        }
    }
}

impl fmt::Display for DecisionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DecisionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown decision type: {}", s))
    }
}

/// Output of the Context Analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub decision_type: DecisionType,
    pub required_context: Vec<String>,
    pub provided_context: Vec<String>,
    pub missing_context: Vec<String>,
    /// Share of required context that was provided (0-100)
    pub completeness_score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// An assumption the Proposer relies on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Assumption {
    /// The assumption being made
    pub statement: String,
    /// What context or reasoning the assumption is based on
    pub basis: String,
    /// Risk if the assumption turns out to be wrong
    pub risk_level: RiskLevel,
}

/// Output of the Proposer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProposerOutput {
    /// Clear directive: proceed, delay, or conditional (with conditions)
    pub recommendation: String,
    /// Every assumption the recommendation depends on
    pub assumptions: Vec<Assumption>,
    /// Confidence in the recommendation (0-100)
    pub confidence: u8,
    /// Reasoning based only on the provided context
    pub justification: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

/// A concrete way the decision could fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureScenario {
    pub description: String,
    /// What sets the failure off
    pub trigger: String,
    pub impact_severity: Severity,
}

/// Risk scores across the four attack dimensions, each 0-10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RiskBreakdown {
    pub execution: u8,
    pub market_customer: u8,
    pub reputational: u8,
    pub opportunity_cost: u8,
}

/// Output of the Devil's Advocate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DevilsAdvocateOutput {
    /// Specific challenges to the recommendation, at least one per dimension
    pub counterarguments: Vec<String>,
    pub failure_scenarios: Vec<FailureScenario>,
    /// Proposer assumptions that are unverified or high-risk
    pub high_risk_assumptions: Vec<String>,
    pub risk_breakdown: RiskBreakdown,
}

/// Which side of the debate a claim came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ClaimSource {
    Proposer,
    Advocate,
}

/// A vague or poorly reasoned claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WeakClaim {
    pub source: ClaimSource,
    pub claim: String,
    pub weakness_reason: String,
}

/// A claim not backed by the provided context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UnsupportedClaim {
    pub source: ClaimSource,
    pub claim: String,
    pub missing_evidence: String,
}

/// Output of the Judge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JudgeOutput {
    /// Reasoning quality of the Proposer (0-10)
    pub proposer_strength: u8,
    /// Reasoning quality of the Devil's Advocate (0-10)
    pub advocate_strength: u8,
    pub weak_claims: Vec<WeakClaim>,
    pub unsupported_claims: Vec<UnsupportedClaim>,
    /// Two or three sentence overall assessment
    pub reasoning_assessment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidencePenalty {
    pub reason: String,
    pub percentage_impact: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceImprovement {
    pub reason: String,
    pub percentage_impact: u8,
}

/// Output of the Confidence Estimator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceOutput {
    pub initial_confidence: u8,
    pub adjusted_confidence: u8,
    /// `adjusted_confidence - initial_confidence`
    pub delta: i32,
    pub penalties: Vec<ConfidencePenalty>,
    #[serde(default)]
    pub improvements: Vec<ConfidenceImprovement>,
}

/// One complete, immutable evaluation of a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRun {
    /// `dec_<YYYYMMDD>_<type>_<HHMMSS>_<suffix>`
    pub decision_id: String,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub decision: String,
    pub context_provided: Option<String>,
    pub context_analysis: ContextAnalysis,
    pub proposer_output: ProposerOutput,
    pub devils_advocate_output: DevilsAdvocateOutput,
    pub judge_output: JudgeOutput,
    pub confidence_output: ConfidenceOutput,
    pub final_recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// API representation of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionResponse {
    #[serde(flatten)]
    pub run: DecisionRun,
    pub risk_breakdown: RiskBreakdown,
}

impl From<DecisionRun> for DecisionResponse {
    fn from(run: DecisionRun) -> Self {
        let risk_breakdown = run.devils_advocate_output.risk_breakdown;
        Self { run, risk_breakdown }
    }
}

/// Condensed view of one version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub context_completeness: u8,
    pub adjusted_confidence: u8,
    pub final_recommendation: String,
}

impl From<&DecisionRun> for VersionSummary {
    fn from(run: &DecisionRun) -> Self {
        Self {
            version: run.version,
            timestamp: run.timestamp,
            context_completeness: run.context_analysis.completeness_score,
            adjusted_confidence: run.confidence_output.adjusted_confidence,
            final_recommendation: run.final_recommendation.clone(),
        }
    }
}

/// Change in each risk dimension between two versions (negative is better)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskDelta {
    pub execution: i32,
    pub market_customer: i32,
    pub reputational: i32,
    pub opportunity_cost: i32,
}

impl RiskDelta {
    pub fn between(before: &RiskBreakdown, after: &RiskBreakdown) -> Self {
        let diff = |a: u8, b: u8| i32::from(b) - i32::from(a);
        Self {
            execution: diff(before.execution, after.execution),
            market_customer: diff(before.market_customer, after.market_customer),
            reputational: diff(before.reputational, after.reputational),
            opportunity_cost: diff(before.opportunity_cost, after.opportunity_cost),
        }
    }
}

/// Quantified difference between two versions of a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub decision_id: String,
    pub v1: i64,
    pub v2: i64,
    pub context_completeness_delta: i32,
    pub confidence_delta: i32,
    pub risk_reduction: RiskDelta,
    /// Missing in v1 but provided in v2
    pub resolved_missing_context: Vec<String>,
    /// Missing in both
    pub remaining_missing_context: Vec<String>,
    /// Missing in v2 only
    pub new_missing_context: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_type_round_trips_through_str() {
        for ty in DecisionType::ALL {
            assert_eq!(ty.as_str().parse::<DecisionType>().unwrap(), ty);
        }
        assert!("marketing".parse::<DecisionType>().is_err());
    }

    #[test]
    fn test_every_type_requires_six_dimensions() {
        for ty in DecisionType::ALL {
            assert_eq!(ty.required_context().len(), 6, "{}", ty);
        }
    }

    #[test]
    fn test_enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&DecisionType::MarketEntry).unwrap(),
            "\"market_entry\""
        );
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(
            serde_json::from_str::<ClaimSource>("\"advocate\"").unwrap(),
            ClaimSource::Advocate
        );
        assert!(serde_json::from_str::<RiskLevel>("\"extreme\"").is_err());
    }

    #[test]
    fn test_input_context_defaults_to_none() {
        let input: DecisionInput = serde_json::from_str(r#"{"decision":"Ship it?"}"#).unwrap();
        assert_eq!(input.context, None);
        assert_eq!(input.context_str(), "");
    }

    #[test]
    fn test_risk_delta_is_after_minus_before() {
        let before = RiskBreakdown {
            execution: 8,
            market_customer: 5,
            reputational: 3,
            opportunity_cost: 2,
        };
        let after = RiskBreakdown {
            execution: 4,
            market_customer: 5,
            reputational: 6,
            opportunity_cost: 0,
        };
        let delta = RiskDelta::between(&before, &after);
        assert_eq!(delta.execution, -4);
        assert_eq!(delta.market_customer, 0);
        assert_eq!(delta.reputational, 3);
        assert_eq!(delta.opportunity_cost, -2);
    }
}
