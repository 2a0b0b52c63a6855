//! Context Analyzer: classifies the decision and scores context completeness.

use std::sync::Arc;

use tracing::instrument;

use crate::llm::{strip_code_fence, ChatMessage, ChatModel, ChatRequest, LlmError};
use crate::models::{ContextAnalysis, DecisionType};

use super::context_or_placeholder;

/// Words this short are too generic to count as evidence in keyword matching
const MIN_KEYWORD_LEN: usize = 4;

pub struct ContextAnalyzer {
    model: Arc<dyn ChatModel>,
}

impl ContextAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    #[instrument(name = "context_analyzer", skip_all)]
    pub async fn analyze(&self, decision: &str, context: &str) -> Result<ContextAnalysis, LlmError> {
        let decision_type = self.classify(decision, context).await?;
        let required: Vec<String> = decision_type
            .required_context()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let provided = self.extract_provided(decision, context, &required).await?;
        let missing: Vec<String> = required
            .iter()
            .filter(|r| !provided.contains(r))
            .cloned()
            .collect();
        let completeness_score = completeness_score(provided.len(), required.len());

        tracing::info!(
            decision_type = %decision_type,
            provided = provided.len(),
            missing = missing.len(),
            completeness_score,
            "Context analyzed"
        );

        Ok(ContextAnalysis {
            decision_type,
            required_context: required,
            provided_context: provided,
            missing_context: missing,
            completeness_score,
        })
    }

    async fn classify(&self, decision: &str, context: &str) -> Result<DecisionType, LlmError> {
        let prompt = format!(
            "Classify the following business decision into exactly ONE of these types:\n\
             - launch: launching, releasing or deploying products or features\n\
             - pricing: pricing strategy, monetization or cost changes\n\
             - hiring: hiring, team expansion or headcount\n\
             - technical: technical implementation, architecture or infrastructure\n\
             - market_entry: entering new markets or segments\n\n\
             Decision: {}\n\
             Context: {}\n\n\
             Answer with the type name only (launch, pricing, hiring, technical or market_entry).",
            decision,
            if context.trim().is_empty() { "None provided" } else { context },
        );

        let request = ChatRequest::new("context_analyzer.classify", vec![ChatMessage::user(prompt)]);
        let completion = self.model.complete(&request).await?;
        Ok(parse_decision_type(&completion.content))
    }

    async fn extract_provided(
        &self,
        decision: &str,
        context: &str,
        required: &[String],
    ) -> Result<Vec<String>, LlmError> {
        if context.trim().is_empty() {
            return Ok(Vec::new());
        }

        let dimensions = required
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Given a decision and user-provided context, identify which required context dimensions the context addresses, even partially.\n\n\
             Decision: {}\n\
             User Context: {}\n\n\
             Required Context Dimensions:\n{}\n\n\
             Reply with ONLY a JSON array of the addressed dimension names, for example [\"rollback plan\"].",
            decision,
            context_or_placeholder(context),
            dimensions,
        );

        let request = ChatRequest::new("context_analyzer.extract", vec![ChatMessage::user(prompt)]);
        let completion = self.model.complete(&request).await?;

        match serde_json::from_str::<Vec<String>>(strip_code_fence(&completion.content)) {
            Ok(named) => Ok(required
                .iter()
                .filter(|r| named.iter().any(|n| n == *r))
                .cloned()
                .collect()),
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable context extraction, using keyword matching");
                Ok(keyword_matches(context, required))
            }
        }
    }
}

/// Normalize a classifier answer, defaulting to `technical`
pub fn parse_decision_type(answer: &str) -> DecisionType {
    let cleaned = answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
        .to_lowercase();
    cleaned.parse().unwrap_or(DecisionType::Technical)
}

/// Required dimensions with at least one significant word present in the context
pub fn keyword_matches(context: &str, required: &[String]) -> Vec<String> {
    let haystack = context.to_lowercase();
    required
        .iter()
        .filter(|req| {
            req.to_lowercase()
                .split_whitespace()
                .filter(|term| term.chars().count() >= MIN_KEYWORD_LEN)
                .any(|term| haystack.contains(term))
        })
        .cloned()
        .collect()
}

pub fn completeness_score(provided: usize, required: usize) -> u8 {
    if required == 0 {
        return 100;
    }
    let score = (provided * 100) / required;
    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;

    fn analyzer(model: &Arc<ScriptedModel>) -> ContextAnalyzer {
        ContextAnalyzer::new(model.clone())
    }

    #[test]
    fn test_parse_decision_type_normalizes_answers() {
        assert_eq!(parse_decision_type("launch"), DecisionType::Launch);
        assert_eq!(parse_decision_type("  Pricing.\n"), DecisionType::Pricing);
        assert_eq!(parse_decision_type("\"market_entry\""), DecisionType::MarketEntry);
        assert_eq!(parse_decision_type("marketing"), DecisionType::Technical);
        assert_eq!(parse_decision_type(""), DecisionType::Technical);
    }

    #[test]
    fn test_completeness_score() {
        assert_eq!(completeness_score(0, 6), 0);
        assert_eq!(completeness_score(1, 6), 16);
        assert_eq!(completeness_score(2, 6), 33);
        assert_eq!(completeness_score(6, 6), 100);
        assert_eq!(completeness_score(0, 0), 100);
    }

    #[test]
    fn test_keyword_matches_ignores_short_words() {
        let required: Vec<String> = DecisionType::Launch
            .required_context()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let matched = keyword_matches(
            "Code is ready. Rollback plan documented. Monitoring configured.",
            &required,
        );
        assert_eq!(matched, vec!["rollback plan", "monitoring and alerting setup"]);
        assert!(keyword_matches("it is ok and so on", &required).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_with_model_extraction() {
        let model = Arc::new(ScriptedModel::new([
            "launch",
            r#"["rollback plan", "deployment readiness", "not a dimension", "rollback plan"]"#,
        ]));

        let analysis = analyzer(&model)
            .analyze("Can we launch this week?", "Deploy pipeline green, rollback rehearsed")
            .await
            .unwrap();

        assert_eq!(analysis.decision_type, DecisionType::Launch);
        assert_eq!(analysis.required_context.len(), 6);
        // Filtered to known names, deduplicated, in required order
        assert_eq!(analysis.provided_context, vec!["deployment readiness", "rollback plan"]);
        assert_eq!(analysis.missing_context.len(), 4);
        assert!(!analysis.missing_context.contains(&"rollback plan".to_string()));
        assert_eq!(analysis.completeness_score, 33);
    }

    #[tokio::test]
    async fn test_analyze_falls_back_to_keywords() {
        let model = Arc::new(ScriptedModel::new(["hiring", "The candidate looks great!"]));

        let analysis = analyzer(&model)
            .analyze("Should we hire?", "Budget approved for Q3")
            .await
            .unwrap();

        assert_eq!(analysis.decision_type, DecisionType::Hiring);
        assert_eq!(analysis.provided_context, vec!["budget and runway"]);
        assert_eq!(analysis.completeness_score, 16);
    }

    #[tokio::test]
    async fn test_analyze_without_context_skips_extraction() {
        let model = Arc::new(ScriptedModel::new(["technical"]));

        let analysis = analyzer(&model).analyze("Refactor auth?", "").await.unwrap();

        assert!(analysis.provided_context.is_empty());
        assert_eq!(analysis.missing_context.len(), 6);
        assert_eq!(analysis.completeness_score, 0);
        assert_eq!(model.requests().len(), 1);
        assert!(model.requests()[0]
            .last_user_message()
            .unwrap()
            .contains("Context: None provided"));
    }

    #[tokio::test]
    async fn test_analyze_propagates_model_failure() {
        let model = Arc::new(ScriptedModel::default());
        model.push_failure(500);

        let err = analyzer(&model).analyze("Ship?", "ready").await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 500, .. }));
    }
}
