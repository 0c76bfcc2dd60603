//! Inbound review event payloads.
//!
//! The GitHub-facing app flattens each webhook it receives into one
//! `EventPayload`. Only `kind`, `pr_number` and `repo_full_name` are
//! guaranteed; everything else may be missing and must be tolerated.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The event discriminator carried in the `kind` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Inline review comment tied to a diff line.
    ReviewComment,
    /// A submitted review (summary body plus state).
    Review,
    /// A comment in the PR conversation tab.
    IssueComment,
    /// Explicit request for an autonomous full review.
    WizardReviewCommand,
    /// Anything else; the original tag is kept for context building.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ReviewComment => "review_comment",
            EventKind::Review => "review",
            EventKind::IssueComment => "issue_comment",
            EventKind::WizardReviewCommand => "wizard_review_command",
            EventKind::Other(kind) => kind,
        }
    }

    /// Kinds that get a follow-up action beyond the debug comment.
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            EventKind::ReviewComment | EventKind::Review | EventKind::IssueComment
        )
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "review_comment" => EventKind::ReviewComment,
            "review" => EventKind::Review,
            "issue_comment" => EventKind::IssueComment,
            "wizard_review_command" => EventKind::WizardReviewCommand,
            _ => EventKind::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one changed file in the PR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub additions: Option<u64>,
    #[serde(default)]
    pub deletions: Option<u64>,
    #[serde(default)]
    pub changes: Option<u64>,
    #[serde(default)]
    pub patch: Option<String>,
}

/// Summary of an inline comment already attached to a review.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewCommentInfo {
    pub id: u64,
    pub body: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub diff_hunk: Option<String>,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub original_line: Option<u64>,
    #[serde(default)]
    pub user_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub kind: EventKind,
    pub pr_number: u64,
    pub repo_full_name: String,

    #[serde(default)]
    pub repo_owner: Option<String>,
    #[serde(default)]
    pub repo_name: Option<String>,
    #[serde(default)]
    pub pr_title: Option<String>,
    #[serde(default)]
    pub pr_body: Option<String>,
    #[serde(default)]
    pub pr_author_login: Option<String>,
    #[serde(default)]
    pub reviewer_login: Option<String>,

    #[serde(default)]
    pub review_body: Option<String>,
    #[serde(default)]
    pub review_state: Option<String>,

    #[serde(default)]
    pub comment_body: Option<String>,
    #[serde(default)]
    pub comment_path: Option<String>,
    #[serde(default)]
    pub comment_diff_hunk: Option<String>,
    #[serde(default)]
    pub comment_position: Option<u64>,
    #[serde(default)]
    pub comment_id: Option<u64>,

    #[serde(default)]
    pub files: Option<Vec<FileInfo>>,
    #[serde(default)]
    pub review_comments: Option<Vec<ReviewCommentInfo>>,
    #[serde(default)]
    pub inline_comment_count: Option<u64>,
}

impl EventPayload {
    /// Minimal payload with only the always-present fields set.
    pub fn new(kind: EventKind, pr_number: u64, repo_full_name: impl Into<String>) -> Self {
        Self {
            kind,
            pr_number,
            repo_full_name: repo_full_name.into(),
            repo_owner: None,
            repo_name: None,
            pr_title: None,
            pr_body: None,
            pr_author_login: None,
            reviewer_login: None,
            review_body: None,
            review_state: None,
            comment_body: None,
            comment_path: None,
            comment_diff_hunk: None,
            comment_position: None,
            comment_id: None,
            files: None,
            review_comments: None,
            inline_comment_count: None,
        }
    }

    /// The text the reviewer actually wrote for this event: the review body for
    /// submitted reviews, the comment body for everything else.
    pub fn original_text(&self) -> &str {
        let text = match self.kind {
            EventKind::Review => self.review_body.as_deref(),
            _ => self.comment_body.as_deref(),
        };
        text.unwrap_or("").trim()
    }

    /// Comment body if non-empty, else review body, trimmed.
    pub fn comment_or_review_text(&self) -> &str {
        self.comment_body
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.review_body.as_deref())
            .unwrap_or("")
            .trim()
    }

    pub fn has_attached_inline_comments(&self) -> bool {
        self.inline_comment_count.unwrap_or(0) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_payload_deserializes() {
        let payload: EventPayload = serde_json::from_value(json!({
            "kind": "review_comment",
            "pr_number": 42,
            "repo_full_name": "octo/widgets"
        }))
        .unwrap();

        assert_eq!(payload.kind, EventKind::ReviewComment);
        assert_eq!(payload.pr_number, 42);
        assert!(payload.comment_body.is_none());
        assert!(payload.files.is_none());
        assert!(!payload.has_attached_inline_comments());
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let payload: EventPayload = serde_json::from_value(json!({
            "kind": "discussion_comment",
            "pr_number": 1,
            "repo_full_name": "octo/widgets"
        }))
        .unwrap();

        assert_eq!(
            payload.kind,
            EventKind::Other("discussion_comment".to_string())
        );
        assert!(!payload.kind.is_actionable());

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "discussion_comment");
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let result: Result<EventPayload, _> = serde_json::from_value(json!({
            "kind": "review",
            "repo_full_name": "octo/widgets"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_full_review_payload() {
        let payload: EventPayload = serde_json::from_value(json!({
            "kind": "review",
            "pr_number": 7,
            "repo_full_name": "octo/widgets",
            "review_body": "  Looks mostly fine  ",
            "review_state": "commented",
            "inline_comment_count": 2,
            "review_comments": [
                {"id": 10, "body": "nit", "path": "src/lib.rs", "line": 3, "user_login": "alice"}
            ],
            "files": [
                {"filename": "src/lib.rs", "status": "modified", "additions": 3, "deletions": 1, "changes": 4, "patch": "@@ -1 +1 @@"}
            ]
        }))
        .unwrap();

        assert!(payload.has_attached_inline_comments());
        assert_eq!(payload.original_text(), "Looks mostly fine");
        assert_eq!(payload.review_comments.as_ref().unwrap()[0].line, Some(3));
        assert_eq!(payload.files.as_ref().unwrap()[0].additions, Some(3));
    }

    #[test]
    fn test_original_text_prefers_comment_for_non_review_kinds() {
        let mut payload = EventPayload::new(EventKind::IssueComment, 1, "octo/widgets");
        payload.comment_body = Some("why?".to_string());
        payload.review_body = Some("ignored".to_string());
        assert_eq!(payload.original_text(), "why?");

        payload.comment_body = None;
        assert_eq!(payload.original_text(), "");
        assert_eq!(payload.comment_or_review_text(), "ignored");
    }
}
