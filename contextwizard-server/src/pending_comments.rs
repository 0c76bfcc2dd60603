use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::store::{PendingComment, RepositoryError};
use crate::AppState;

/// Furthest ahead a pending comment may expire.
const MAX_EXPIRY_AHEAD_SECS: i64 = 24 * 60 * 60;

pub fn pending_comments_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pending-comments", post(create_pending_comment))
        .route("/pending-comments/expired/list", get(list_expired_comments))
        .route(
            "/pending-comments/{code}",
            get(get_pending_comment).delete(delete_pending_comment),
        )
}

/// Store failures as HTTP responses with a `detail` message.
pub struct ApiError {
    status: StatusCode,
    detail: &'static str,
}

impl ApiError {
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: "Code not found",
        }
    }

    fn bad_request(detail: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail,
        }
    }
}

/// Expiry must fall within the next 24 hours; `now` itself is accepted.
fn validate_expires_at(expires_at: i64, now: i64) -> Result<(), ApiError> {
    if expires_at < now {
        return Err(ApiError::bad_request("expires_at must be in the future"));
    }
    if expires_at > now.saturating_add(MAX_EXPIRY_AHEAD_SECS) {
        return Err(ApiError::bad_request(
            "expires_at cannot be more than 24 hours in the future",
        ));
    }
    Ok(())
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(_) => Self {
                status: StatusCode::CONFLICT,
                detail: "Code already exists",
            },
            other => {
                error!("Pending comment store failure: {}", other);
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "Pending comment store unavailable",
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ExpiredCommentsResponse {
    pub expired_comments: Vec<PendingComment>,
}

async fn create_pending_comment(
    State(state): State<Arc<AppState>>,
    Json(comment): Json<PendingComment>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    validate_expires_at(comment.expires_at, state.clock.now_secs())?;

    let code = comment.code.clone();
    let comment_id = comment.comment_id;
    state.store.create(comment).await?;

    info!("Stored pending comment: code={}, comment_id={}", code, comment_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "created", "code": code })),
    ))
}

async fn get_pending_comment(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<PendingComment>, ApiError> {
    state
        .store
        .get(&code)
        .await?
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn delete_pending_comment(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.store.delete(&code).await? {
        return Err(ApiError::not_found());
    }

    info!("Deleted pending comment: code={}", code);
    Ok(Json(json!({ "status": "deleted", "code": code })))
}

async fn list_expired_comments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ExpiredCommentsResponse>, ApiError> {
    let now = state.clock.now_secs();
    let expired_comments = state.store.list_expired(now).await?;

    info!("Found {} expired comments", expired_comments.len());
    Ok(Json(ExpiredCommentsResponse { expired_comments }))
}
