use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::ClipLimits;
use crate::context::build_llm_context;
use crate::llm::{RetryPolicy, StructuredGenerator};
use crate::payload::EventPayload;
use crate::schema::{generate_validated, Classification};

const CLASSIFICATION_PROMPT: &str = r#"You are a code review assistant that classifies GitHub PR comments into exactly ONE category.

Comments come from three places:
1. Inline review comments, attached to specific code lines
2. PR conversation comments, about the PR as a whole
3. Review summaries, submitted with a review

Decide in this order:
1) Intent: praise, question or change request
2) Clarity: good or bad

Categories: PRAISE, GOOD_CHANGE, BAD_CHANGE, GOOD_QUESTION, BAD_QUESTION, UNKNOWN

Rules:
- PRAISE: positive feedback or acknowledgment ("nice work", "LGTM", "looks good")
- GOOD_CHANGE: a clear, actionable change request with enough context
- BAD_CHANGE: an underspecified change request (missing which file, which function, or what exactly to change)
- GOOD_QUESTION: a clear question whose subject is obvious from context
- BAD_QUESTION: a vague or ambiguous question
- UNKNOWN: the intent cannot be determined with confidence

Notes:
- "bad" means unclear or underspecified, NOT rude
- needs_reply is true ONLY for GOOD_CHANGE, BAD_CHANGE, BAD_QUESTION
- needs_clarification is true ONLY for BAD_CHANGE, BAD_QUESTION
- Be more lenient with conversation comments that have no code context
- One-word comments such as "wow", "nice", "thanks" are PRAISE
- "why", "how" and "what" questions are questions, not change requests
- "can you", "please add", "should we" phrasing is a change request

Return ONLY valid JSON for the schema."#;

/// Assigns a review event to one of the six categories.
pub struct Classifier {
    generator: Arc<dyn StructuredGenerator>,
    model: String,
    retry: RetryPolicy,
    limits: ClipLimits,
}

impl Classifier {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        model: impl Into<String>,
        retry: RetryPolicy,
        limits: ClipLimits,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            retry,
            limits,
        }
    }

    pub async fn classify(&self, payload: &EventPayload) -> Result<Classification> {
        let context = build_llm_context(payload, &self.limits);
        let prompt = format!("{}\n\nCONTEXT:\n{}", CLASSIFICATION_PROMPT, context);

        let classification: Classification = generate_validated(
            self.generator.as_ref(),
            &self.retry,
            "classify_comment",
            &self.model,
            prompt,
        )
        .await?;

        info!(
            "Classified {} on {}#{} as {} (confidence={:.2})",
            payload.kind,
            payload.repo_full_name,
            payload.pr_number,
            classification.category,
            classification.confidence
        );

        Ok(classification)
    }
}
