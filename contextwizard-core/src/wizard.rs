//! Autonomous full-PR review, triggered by an explicit command.

use anyhow::Result;
use std::sync::Arc;

use crate::config::ClipLimits;
use crate::context::build_llm_context;
use crate::llm::{RetryPolicy, TextGenerator, TextRequest};
use crate::payload::EventPayload;

pub const NO_ISSUES_MESSAGE: &str = "✅ No significant issues detected in this PR.";

const WIZARD_PROMPT: &str = r#"You are the 'ContextWizard' AI Reviewer performing an autonomous code review.

Your task:
1. Analyze the provided PR diff hunks and changed files
2. Identify potential issues in these categories:
   - Bugs or logic errors
   - Security vulnerabilities
   - Performance problems
   - Code quality issues
   - Best practice violations

Output format (markdown). For each issue found, provide:

### [Issue Title]
**Severity**: High/Medium/Low
**Description**: What the problem is and why it matters
**Suggestion**: A specific, actionable fix

Rules:
- Be concise but thorough
- Focus on real issues, not style preferences
- Give specific line references when possible
- If no issues are found, say "No significant issues detected"
- Report at most 5 issues"#;

pub struct AutonomousReviewer {
    generator: Arc<dyn TextGenerator>,
    model: String,
    retry: RetryPolicy,
    limits: ClipLimits,
}

impl AutonomousReviewer {
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

    /// Review the whole PR. Returns the model's markdown, or
    /// [`NO_ISSUES_MESSAGE`] when it produced nothing.
    pub async fn review(&self, payload: &EventPayload) -> Result<String> {
        let request = TextRequest {
            model: self.model.clone(),
            prompt: format!(
                "{}\n\n{}",
                WIZARD_PROMPT,
                build_llm_context(payload, &self.limits)
            ),
            temperature: 0.3,
            max_output_tokens: Some(2048),
        };

        let text = self
            .retry
            .run("wizard_review", || self.generator.generate_text(&request))
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Ok(NO_ISSUES_MESSAGE.to_string());
        }
        Ok(text.to_string())
    }
}
