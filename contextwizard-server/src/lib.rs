pub mod analyze;
pub mod clock;
pub mod config;
pub mod pending_comments;
pub mod store;

use axum::{response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use clock::Clock;
use contextwizard_core::{RecordingLogger, ReviewPipeline};
use store::PendingCommentRepository;

pub struct AppState {
    pub pipeline: ReviewPipeline,
    pub store: Arc<dyn PendingCommentRepository>,
    pub recording_logger: Option<RecordingLogger>,
    pub clock: Arc<dyn Clock>,
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "ContextWizard Backend is running" }))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "contextwizard",
        "version": contextwizard_core::get_version(),
    }))
}

/// All HTTP routes, with request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(analyze::analyze_router())
        .merge(pending_comments::pending_comments_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use super::test_support::{send, state_with};
    use super::*;
    use axum::http::StatusCode;
    use contextwizard_core::testing::ScriptedBackend;

    #[tokio::test]
    async fn test_root_and_health() {
        let scripted = ScriptedBackend::new(vec![], vec![]);
        let router = app(state_with(&scripted));

        let (status, body) = send(router.clone(), "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "ContextWizard Backend is running");

        let (status, body) = send(router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "contextwizard");
        assert!(body["version"].is_string());
    }
}
