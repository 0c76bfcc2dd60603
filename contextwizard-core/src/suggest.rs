//! Code suggestions for change requests.

use anyhow::Result;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::config::ClipLimits;
use crate::context::build_llm_context;
use crate::llm::{RetryPolicy, TextGenerator, TextRequest};
use crate::payload::EventPayload;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[a-zA-Z0-9_-]*\n.*?\n```").expect("fenced block pattern is valid")
});

const EMPTY_DIFF: &str = "```diff\n```";

/// Reduce model output to a single fenced code block. Never fails.
///
/// Empty output becomes an empty diff block. Otherwise the first complete
/// fenced block wins; failing that, everything from the first fence marker;
/// failing that, the whole text wrapped in a plain fence.
pub fn extract_first_fenced_code_block(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return EMPTY_DIFF.to_string();
    }

    if let Some(m) = FENCED_BLOCK.find(text) {
        return m.as_str().trim().to_string();
    }

    if let Some(start) = text.find("```") {
        return text[start..].trim().to_string();
    }

    format!("```\n{}\n```", text)
}

fn suggestion_prompt(reviewer_comment: &str, context: &str) -> String {
    format!(
        r#"You are a GitHub code review assistant.
Goal: produce a SHORT, STRICT code suggestion for the requested change.

Hard rules:
- Output MUST be exactly ONE fenced code block and NOTHING else.
- The code block language MUST be either:
  1) ```diff  (preferred)
  2) ```suggestion (only if a diff isn't possible)
- Keep it minimal: change ONLY the smallest relevant lines.
- Do NOT rewrite whole files. Do NOT include unrelated context.
- If unsure, output a SMALL diff that adds TODOs or placeholders rather than guessing.

Comment to satisfy (source of truth):
{}

CONTEXT (reference only):
---
{}
---

Return ONLY the single fenced code block now."#,
        reviewer_comment, context
    )
}

pub struct SuggestionGenerator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    retry: RetryPolicy,
    limits: ClipLimits,
}

impl SuggestionGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
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

    /// Generate a fenced suggestion for `payload`. `comment_override`, when
    /// given, replaces the reviewer's own wording as the request to satisfy.
    pub async fn generate(
        &self,
        payload: &EventPayload,
        comment_override: Option<&str>,
    ) -> Result<String> {
        let reviewer_comment = match comment_override {
            Some(text) if !text.is_empty() => text.trim(),
            _ => payload.comment_or_review_text(),
        };
        let context = build_llm_context(payload, &self.limits);

        let request = TextRequest {
            model: self.model.clone(),
            prompt: suggestion_prompt(reviewer_comment, &context),
            temperature: 0.2,
            max_output_tokens: None,
        };

        let text = self
            .retry
            .run("generate_code_suggestion", || {
                self.generator.generate_text(&request)
            })
            .await?;

        Ok(extract_first_fenced_code_block(&text))
    }
}
