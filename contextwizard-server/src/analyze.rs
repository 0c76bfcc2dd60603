use axum::{extract::State, response::Json, routing::post, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use contextwizard_core::recording::in_analysis;
use contextwizard_core::{CorrelationId, EventPayload};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub comment: String,
}

pub fn analyze_router() -> Router<Arc<AppState>> {
    Router::new().route("/analyze-review", post(analyze_review_handler))
}

async fn analyze_review_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EventPayload>,
) -> Json<AnalyzeResponse> {
    let correlation_id = CorrelationId::generate();

    if let Some(logger) = &state.recording_logger {
        logger.record_review_request(&correlation_id, &payload);
    }

    let comment = in_analysis(correlation_id.clone(), state.pipeline.analyze(&payload)).await;

    info!(
        "Analyzed {} for {}#{} ({} chars, correlation {})",
        payload.kind,
        payload.repo_full_name,
        payload.pr_number,
        comment.chars().count(),
        correlation_id.as_str()
    );

    if let Some(logger) = &state.recording_logger {
        logger.record_review_response(&correlation_id, &payload, &comment);
    }

    Json(AnalyzeResponse { comment })
}

#[cfg(test)]
mod tests {
    use crate::app;
    use crate::test_support::{send, state_with};
    use axum::http::StatusCode;
    use contextwizard_core::testing::{classification_json, ScriptedBackend};
    use contextwizard_core::RecordingLogger;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_good_change_returns_suggestion_block() {
        let scripted = ScriptedBackend::new(
            vec![Ok("```diff\n-y\n+x\n```".to_string())],
            vec![classification_json("GOOD_CHANGE", 0.85)],
        );
        let router = app(state_with(&scripted));

        let (status, body) = send(
            router,
            "POST",
            "/analyze-review",
            Some(json!({
                "kind": "review_comment",
                "pr_number": 4,
                "repo_full_name": "acme/widgets",
                "comment_body": "please rename this variable to x"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"comment": "```diff\n-y\n+x\n```"}));
    }

    #[tokio::test]
    async fn test_review_with_inline_comments_returns_empty_comment() {
        let scripted = ScriptedBackend::new(vec![], vec![]);
        let router = app(state_with(&scripted));

        let (status, body) = send(
            router,
            "POST",
            "/analyze-review",
            Some(json!({
                "kind": "review",
                "pr_number": 4,
                "repo_full_name": "acme/widgets",
                "review_body": "see inline",
                "inline_comment_count": 3
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comment"], "");
        assert_eq!(scripted.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_recorded_request_and_response_share_an_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recordings.jsonl");
        let scripted = ScriptedBackend::new(vec![], vec![classification_json("PRAISE", 0.9)]);
        let mut state = state_with(&scripted);
        Arc::get_mut(&mut state).unwrap().recording_logger =
            Some(RecordingLogger::open(path.clone()).await.unwrap());
        let router = app(state);

        let (status, _) = send(
            router,
            "POST",
            "/analyze-review",
            Some(json!({
                "kind": "issue_comment",
                "pr_number": 9,
                "repo_full_name": "acme/widgets",
                "comment_body": "nice work"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let mut events: Vec<Value> = Vec::new();
        for _ in 0..100 {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                events = contents
                    .lines()
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect();
                if events.len() == 2 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["direction"], "Request");
        assert_eq!(events[0]["metadata"]["pr_number"], "9");
        assert_eq!(events[1]["direction"], "Response");
        assert_eq!(events[0]["correlation_id"], events[1]["correlation_id"]);
    }

    #[tokio::test]
    async fn test_missing_required_fields_are_rejected() {
        let scripted = ScriptedBackend::new(vec![], vec![]);
        let router = app(state_with(&scripted));

        let (status, _) = send(
            router,
            "POST",
            "/analyze-review",
            Some(json!({"kind": "review_comment"})),
        )
        .await;

        assert!(status.is_client_error());
        assert_eq!(scripted.total_calls(), 0);
    }
}
