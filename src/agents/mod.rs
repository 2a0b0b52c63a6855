//! Evaluation agents.
//!
//! Four agents consult the chat model (Context Analyzer, Proposer, Devil's
//! Advocate, Judge); the Confidence Estimator is deterministic and turns their
//! outputs into an adjusted confidence and a final recommendation.

pub mod confidence;
pub mod context_analyzer;
pub mod devils_advocate;
pub mod judge;
pub mod proposer;

pub use confidence::{ConfidenceEstimator, Verdict};
pub use context_analyzer::ContextAnalyzer;
pub use devils_advocate::DevilsAdvocate;
pub use judge::Judge;
pub use proposer::Proposer;

/// Placeholder used in prompts when the user gave no context
const NO_CONTEXT: &str = "No context provided";

fn context_or_placeholder(context: &str) -> &str {
    if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    }
}

/// Render items as an indented bullet list, or "None"
fn bullet_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let lines: Vec<String> = items
        .into_iter()
        .map(|item| format!("  - {}", item.as_ref()))
        .collect();
    if lines.is_empty() {
        "  None".to_string()
    } else {
        lines.join("\n")
    }
}

/// First `max` characters of `text`, on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
