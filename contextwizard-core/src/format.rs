//! Markdown rendering of pipeline results. Pure functions, no I/O.

use crate::context::clip_with_ellipsis;
use crate::payload::EventPayload;
use crate::schema::{ClarifiedQuestion, Classification};

const DEBUG_QUOTE_LIMIT: usize = 500;
const QUESTION_QUOTE_LIMIT: usize = 800;
const WIZARD_ERROR_LIMIT: usize = 200;

fn quote(text: &str) -> String {
    format!("> {}", text).replace('\n', "\n> ")
}

/// Classification details plus the quoted original text.
pub fn format_debug_comment(payload: &EventPayload, classification: &Classification) -> String {
    let original = clip_with_ellipsis(payload.original_text(), DEBUG_QUOTE_LIMIT);

    let lines = [
        "🧠 **ContextWizard (debug: classification only)**".to_string(),
        format!("- category: **{}**", classification.category),
        format!("- confidence: {:.2}", classification.confidence),
        format!("- reason: {}", classification.short_reason),
        String::new(),
        "**Original text:**".to_string(),
        quote(&original),
        String::new(),
        "_(classification only; no follow-up action taken)_".to_string(),
    ];
    lines.join("\n").trim().to_string()
}

pub fn format_clarified_question_comment(
    payload: &EventPayload,
    classification: &Classification,
    clarified: &ClarifiedQuestion,
) -> String {
    let original = clip_with_ellipsis(payload.comment_or_review_text(), QUESTION_QUOTE_LIMIT);

    let lines = [
        "❓ **ContextWizard (clarified question)**".to_string(),
        format!("- category: **{}**", classification.category),
        format!("- classification_confidence: {:.2}", classification.confidence),
        format!("- rewrite_confidence: {:.2}", clarified.confidence),
        String::new(),
        "**Original question:**".to_string(),
        quote(&original),
        String::new(),
        "**Proposed clarified version:**".to_string(),
        quote(&clarified.clarified_question),
    ];
    lines.join("\n").trim().to_string()
}

pub fn format_clarified_change_comment(clarified_request: &str, suggestion_block: &str) -> String {
    format!(
        "1- **clarified version:** {}\n2- **suggested code change:**\n{}",
        clarified_request,
        suggestion_block.trim()
    )
    .trim()
    .to_string()
}

pub fn format_wizard_comment(review: &str) -> String {
    format!(
        "🧙‍♂️ **ContextWizard Autonomous Review**\n\n{}\n\n---\n_This is an AI-generated code review. Please verify all suggestions before applying._",
        review
    )
}

pub fn format_wizard_error(error: &anyhow::Error) -> String {
    let message: String = format!("{:#}", error)
        .chars()
        .take(WIZARD_ERROR_LIMIT)
        .collect();
    format!(
        "❌ **Wizard Review Error**\n\nFailed to complete autonomous review: {}",
        message
    )
}
