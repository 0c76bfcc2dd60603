//! The decision tree that turns one review event into one comment.

use anyhow::Result;
use tracing::{info, warn};

use crate::classify::Classifier;
use crate::clarify::Clarifier;
use crate::config::{PipelineConfig, Thresholds};
use crate::format::{
    format_clarified_change_comment, format_clarified_question_comment, format_debug_comment,
    format_wizard_comment, format_wizard_error,
};
use crate::llm::LlmBackend;
use crate::payload::{EventKind, EventPayload};
use crate::schema::{Category, Classification};
use crate::suggest::SuggestionGenerator;
use crate::wizard::AutonomousReviewer;

const FAILURE_DESCRIPTION_LIMIT: usize = 160;

/// Orchestrates classification and the follow-up action for each event.
///
/// Every outcome is a comment string. Stage failures become a debug comment
/// for a synthesized UNKNOWN classification; they never escape `analyze`.
pub struct ReviewPipeline {
    classifier: Classifier,
    clarifier: Clarifier,
    suggester: SuggestionGenerator,
    reviewer: AutonomousReviewer,
    thresholds: Thresholds,
}

fn describe_failure(error: &anyhow::Error) -> String {
    format!("{:#}", error)
        .chars()
        .take(FAILURE_DESCRIPTION_LIMIT)
        .collect()
}

impl ReviewPipeline {
    pub fn new(config: PipelineConfig, backend: LlmBackend) -> Self {
        let PipelineConfig {
            models,
            retry,
            limits,
            thresholds,
        } = config;

        Self {
            classifier: Classifier::new(
                backend.structured.clone(),
                models.classification_model.clone(),
                retry.clone(),
                limits,
            ),
            clarifier: Clarifier::new(
                backend.structured,
                models.classification_model.clone(),
                retry.clone(),
                limits,
            ),
            suggester: SuggestionGenerator::new(
                backend.text.clone(),
                models.code_model,
                retry.clone(),
                limits,
            ),
            reviewer: AutonomousReviewer::new(
                backend.text,
                models.classification_model,
                retry,
                limits,
            ),
            thresholds,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub async fn analyze(&self, payload: &EventPayload) -> String {
        info!(
            "Processing {} for {}#{}",
            payload.kind, payload.repo_full_name, payload.pr_number
        );

        if payload.kind == EventKind::WizardReviewCommand {
            return match self.reviewer.review(payload).await {
                Ok(review) => format_wizard_comment(&review),
                Err(e) => {
                    warn!("Wizard review failed: {:#}", e);
                    format_wizard_error(&e)
                }
            };
        }

        if payload.kind == EventKind::Review && payload.has_attached_inline_comments() {
            info!(
                "Skipping review with {} inline comments",
                payload.inline_comment_count.unwrap_or(0)
            );
            return String::new();
        }

        let classification = match self.classifier.classify(payload).await {
            Ok(classification) => classification,
            Err(e) => return self.fallback(payload, "Classification failed", &e),
        };

        if !payload.kind.is_actionable() {
            return format_debug_comment(payload, &classification);
        }

        let confidence = classification.confidence;
        match classification.category {
            Category::GoodChange if confidence >= self.thresholds.good_change => {
                match self.suggester.generate(payload, None).await {
                    Ok(block) => block,
                    Err(e) => self.fallback(payload, "Suggestion generation failed", &e),
                }
            }
            Category::BadQuestion if confidence >= self.thresholds.bad_question => {
                match self.clarifier.clarify_question(payload).await {
                    Ok(clarified) => {
                        format_clarified_question_comment(payload, &classification, &clarified)
                    }
                    Err(e) => self.fallback(payload, "Question clarification failed", &e),
                }
            }
            Category::BadChange if confidence >= self.thresholds.bad_change => {
                match self.clarify_and_suggest(payload).await {
                    Ok(comment) => comment,
                    Err(e) => self.fallback(payload, "BAD_CHANGE processing failed", &e),
                }
            }
            _ => format_debug_comment(payload, &classification),
        }
    }

    async fn clarify_and_suggest(&self, payload: &EventPayload) -> Result<String> {
        let clarified = self.clarifier.clarify_change(payload).await?;
        let block = self
            .suggester
            .generate(payload, Some(&clarified.clarified_request))
            .await?;
        Ok(format_clarified_change_comment(
            &clarified.clarified_request,
            &block,
        ))
    }

    fn fallback(&self, payload: &EventPayload, stage: &str, error: &anyhow::Error) -> String {
        warn!("{}: {:#}", stage, error);
        let classification =
            Classification::unknown_fallback(format!("{}: {}", stage, describe_failure(error)));
        format_debug_comment(payload, &classification)
    }
}
