//! Tunables for the analysis pipeline.
//!
//! Everything here is plain data handed to the pipeline at construction time.
//! Reading these values from the environment is the server's job.

use crate::llm::RetryPolicy;

/// Per-field character limits applied when building LLM context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipLimits {
    pub pr_body: usize,
    pub comment: usize,
    pub review: usize,
    pub diff_hunk: usize,
    pub patch: usize,
    pub inline_comment: usize,
}

impl Default for ClipLimits {
    fn default() -> Self {
        Self {
            pr_body: 1200,
            comment: 1500,
            review: 2000,
            diff_hunk: 1200,
            patch: 1200,
            inline_comment: 400,
        }
    }
}

/// Minimum classifier confidence required before acting on a category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub good_change: f64,
    pub bad_question: f64,
    pub bad_change: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            good_change: 0.70,
            bad_question: 0.55,
            bad_change: 0.55,
        }
    }
}

/// Model identifiers: one for classification/clarification/review, one for
/// code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub classification_model: String,
    pub code_model: String,
}

impl ModelConfig {
    pub fn new(classification_model: impl Into<String>, code_model: impl Into<String>) -> Self {
        Self {
            classification_model: classification_model.into(),
            code_model: code_model.into(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new("gemini-2.5-flash", "gemini-2.5-flash")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    pub models: ModelConfig,
    pub retry: RetryPolicy,
    pub limits: ClipLimits,
    pub thresholds: Thresholds,
}
