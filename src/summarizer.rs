//! Summarization agents: the final answer, plus comparison, gap and
//! recommendation summaries. Each is a single model call returning text.

use anyhow::{Context, Result};

use crate::llm::TextGenerator;
use crate::prompts;

/// Answer `query` from the assembled retrieval `context`.
pub async fn summarize_results(llm: &dyn TextGenerator, query: &str, context: &str) -> Result<String> {
    llm.generate(&prompts::summarize_results(query, context))
        .await
        .context("answer summarization failed")
}

pub async fn summarize_comparison(llm: &dyn TextGenerator, comparison_data: &str) -> Result<String> {
    llm.generate(&prompts::summarize_comparison(comparison_data))
        .await
        .context("comparison summarization failed")
}

pub async fn summarize_gaps(llm: &dyn TextGenerator, reference: &str, analyzed: &str) -> Result<String> {
    llm.generate(&prompts::summarize_gaps(reference, analyzed))
        .await
        .context("gap summarization failed")
}

pub async fn summarize_recommendations(
    llm: &dyn TextGenerator,
    analysis: &str,
    gaps: &str,
) -> Result<String> {
    llm.generate(&prompts::summarize_recommendations(analysis, gaps))
        .await
        .context("recommendation summarization failed")
}
