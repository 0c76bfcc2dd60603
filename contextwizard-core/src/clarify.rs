//! Rewrites of unclear questions and change requests.

use anyhow::Result;
use std::sync::Arc;

use crate::config::ClipLimits;
use crate::context::build_llm_context;
use crate::llm::{RetryPolicy, StructuredGenerator};
use crate::payload::EventPayload;
use crate::schema::{generate_validated, ClarifiedChange, ClarifiedQuestion};

const CLARIFY_QUESTION_PROMPT: &str = r#"Rewrite an unclear PR question into a clarified question.

Rules:
- Output must match the JSON schema.
- At most 1-2 short sentences, ending with "?".
- Do NOT answer the question. Do NOT invent facts.
- Use placeholders for anything missing: "<which file?>", "<which function?>", "<expected behavior?>""#;

const CLARIFY_CHANGE_PROMPT: &str = r#"Rewrite an unclear PR change request into a clarified, actionable request.

Rules:
- Output must match the JSON schema.
- Do NOT propose code. Do NOT invent facts.
- "clarified_request" is at most 1-2 short sentences.
- Use placeholders for anything missing: "<which file?>", "<which function?>", "<acceptance criteria?>""#;

pub struct Clarifier {
    generator: Arc<dyn StructuredGenerator>,
    model: String,
    retry: RetryPolicy,
    limits: ClipLimits,
}

impl Clarifier {
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

    fn prompt(&self, instructions: &str, payload: &EventPayload) -> String {
        format!(
            "{}\n\nCONTEXT:\n{}",
            instructions,
            build_llm_context(payload, &self.limits)
        )
    }

    pub async fn clarify_question(&self, payload: &EventPayload) -> Result<ClarifiedQuestion> {
        generate_validated(
            self.generator.as_ref(),
            &self.retry,
            "clarify_bad_question",
            &self.model,
            self.prompt(CLARIFY_QUESTION_PROMPT, payload),
        )
        .await
    }

    pub async fn clarify_change(&self, payload: &EventPayload) -> Result<ClarifiedChange> {
        generate_validated(
            self.generator.as_ref(),
            &self.retry,
            "clarify_bad_change",
            &self.model,
            self.prompt(CLARIFY_CHANGE_PROMPT, payload),
        )
        .await
    }
}
