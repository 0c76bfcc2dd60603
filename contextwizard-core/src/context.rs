//! Flattening of an event payload into a single LLM context block.

use std::fmt::Write;

use crate::config::ClipLimits;
use crate::payload::{EventKind, EventPayload};

/// Marker appended to clipped text.
pub const TRUNCATION_MARKER: &str = "\n…(truncated)…";

const MAX_INLINE_COMMENTS: usize = 5;
const MAX_FILES: usize = 6;

/// Cut `text` to at most `limit` characters, appending [`TRUNCATION_MARKER`]
/// when anything was removed.
///
/// Absent or empty input renders as an empty string. Clipping is idempotent:
/// the first `limit` characters of a clipped string are the kept head, so
/// clipping it again rebuilds the same string.
pub fn clip(text: Option<&str>, limit: usize) -> String {
    let text = match text {
        Some(t) if !t.is_empty() => t,
        _ => return String::new(),
    };

    let char_count = text.chars().count();
    if char_count <= limit {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(limit)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    format!("{}{}", &text[..cut], TRUNCATION_MARKER)
}

/// Cut `text` to `limit` characters with a single ellipsis, for short quotes in
/// rendered comments.
pub(crate) fn clip_with_ellipsis(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(limit).collect();
    clipped.push('…');
    clipped
}

fn or_empty(value: Option<&str>) -> &str {
    value.unwrap_or("")
}

/// Placeholder for metadata the caller did not send.
pub const UNKNOWN_VALUE: &str = "(unknown)";

fn or_unknown<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN_VALUE.to_string())
}

/// Build the context block shared by every LLM prompt.
pub fn build_llm_context(payload: &EventPayload, limits: &ClipLimits) -> String {
    let mut ctx = String::new();

    // Writing into a String cannot fail.
    let _ = write!(
        ctx,
        "Repo: {}\nPR: #{} — {}\nPR author: {}\nPR description (truncated):\n{}",
        payload.repo_full_name,
        payload.pr_number,
        or_empty(payload.pr_title.as_deref()),
        or_unknown(payload.pr_author_login.as_deref()),
        clip(payload.pr_body.as_deref(), limits.pr_body),
    );
    let mut ctx = ctx.trim_end().to_string();

    let reviewer = or_unknown(payload.reviewer_login.as_deref());
    match &payload.kind {
        EventKind::ReviewComment => {
            let _ = write!(
                ctx,
                "\n\nEvent: inline review comment\nReviewer: {}\nFile path: {}\nOriginal comment: {}\nDiff hunk (truncated):\n{}",
                reviewer,
                or_empty(payload.comment_path.as_deref()),
                clip(payload.comment_body.as_deref(), limits.comment),
                clip(payload.comment_diff_hunk.as_deref(), limits.diff_hunk),
            );
        }
        EventKind::IssueComment => {
            let _ = write!(
                ctx,
                "\n\nEvent: PR conversation comment (from conversation tab)\nCommenter: {}\nComment text: {}\n\n\
                 Context: This is a general comment on the PR, not tied to a specific line of code.\n\
                 The commenter may be asking a question, requesting changes, or providing feedback about the PR as a whole.",
                reviewer,
                clip(payload.comment_body.as_deref(), limits.comment),
            );
        }
        EventKind::Review => {
            let _ = write!(
                ctx,
                "\n\nEvent: review submitted\nReviewer: {}\nState: {}\nReview body: {}",
                reviewer,
                or_unknown(payload.review_state.as_deref()),
                clip(payload.review_body.as_deref(), limits.review),
            );
        }
        EventKind::WizardReviewCommand => {
            let _ = write!(
                ctx,
                "\n\nEvent: Autonomous wizard review requested\nRequester: {}\nTask: Perform comprehensive code review of all changes",
                reviewer,
            );
        }
        EventKind::Other(kind) => {
            let text = payload
                .comment_body
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(payload.review_body.as_deref())
                .unwrap_or("");
            if !text.is_empty() {
                let _ = write!(
                    ctx,
                    "\n\nEvent: {}\nUser: {}\nComment: {}",
                    kind,
                    reviewer,
                    clip(Some(text), limits.comment),
                );
            }
        }
    }
    let mut ctx = ctx.trim_end().to_string();

    if let Some(comments) = payload.review_comments.as_ref().filter(|c| !c.is_empty()) {
        ctx.push_str("\n\nInline comments in this review (showing up to 5):\n");
        for comment in comments.iter().take(MAX_INLINE_COMMENTS) {
            let _ = writeln!(
                ctx,
                "- id={} file={} line={} by {}: {}",
                comment.id,
                or_unknown(comment.path.as_deref()),
                or_unknown(comment.line.or(comment.position)),
                or_unknown(comment.user_login.as_deref()),
                clip(Some(&comment.body), limits.inline_comment),
            );
        }
    }

    if let Some(files) = payload.files.as_ref().filter(|f| !f.is_empty()) {
        let _ = writeln!(
            ctx,
            "\n\nChanged files: {} (showing up to 6 patches, truncated)",
            files.len()
        );
        for file in files.iter().take(MAX_FILES) {
            let _ = writeln!(
                ctx,
                "\n---\nFILE: {}\nSTATUS: {} (+{}/-{}, changes={})\nPATCH:\n{}",
                file.filename,
                or_unknown(file.status.as_deref()),
                or_unknown(file.additions),
                or_unknown(file.deletions),
                or_unknown(file.changes),
                clip(file.patch.as_deref(), limits.patch),
            );
        }
    }

    ctx.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{FileInfo, ReviewCommentInfo};
    use proptest::prelude::*;

    fn base_payload(kind: EventKind) -> EventPayload {
        let mut payload = EventPayload::new(kind, 12, "octo/widgets");
        payload.pr_title = Some("Add caching".to_string());
        payload.pr_author_login = Some("alice".to_string());
        payload.reviewer_login = Some("bob".to_string());
        payload
    }

    #[test]
    fn test_clip_short_and_empty() {
        assert_eq!(clip(None, 10), "");
        assert_eq!(clip(Some(""), 10), "");
        assert_eq!(clip(Some("hello"), 10), "hello");
        assert_eq!(clip(Some("hello"), 5), "hello");
    }

    #[test]
    fn test_clip_long_text_gets_marker() {
        assert_eq!(clip(Some("abcdefgh"), 3), format!("abc{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_clip_counts_characters_not_bytes() {
        let clipped = clip(Some("ééééé"), 2);
        assert_eq!(clipped, format!("éé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_clip_zero_limit() {
        assert_eq!(clip(Some("abc"), 0), TRUNCATION_MARKER);
        assert_eq!(clip(Some(TRUNCATION_MARKER), 0), TRUNCATION_MARKER);
    }

    #[test]
    fn test_clip_of_clipped_text_is_unchanged() {
        let once = clip(Some("abcdefgh"), 3);
        assert_eq!(clip(Some(&once), 3), once);

        let unicode = clip(Some("ééééé"), 2);
        assert_eq!(clip(Some(&unicode), 2), unicode);
    }

    proptest! {
        #[test]
        fn clip_is_idempotent(text in ".{0,80}", limit in 0usize..40) {
            let once = clip(Some(&text), limit);
            let twice = clip(Some(&once), limit);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn clip_keeps_a_prefix(text in ".{0,80}", limit in 0usize..40) {
            let clipped = clip(Some(&text), limit);
            let head = clipped.strip_suffix(TRUNCATION_MARKER).unwrap_or(&clipped);
            prop_assert!(text.starts_with(head));
            prop_assert!(head.chars().count() <= limit.max(text.chars().count()));
        }
    }

    #[test]
    fn test_review_comment_context() {
        let mut payload = base_payload(EventKind::ReviewComment);
        payload.comment_body = Some("please rename this variable to x".to_string());
        payload.comment_path = Some("src/cache.rs".to_string());
        payload.comment_diff_hunk = Some("@@ -1,3 +1,4 @@\n+let y = 1;".to_string());

        let ctx = build_llm_context(&payload, &ClipLimits::default());

        assert!(ctx.starts_with("Repo: octo/widgets\nPR: #12 — Add caching\nPR author: alice"));
        assert!(ctx.contains("Event: inline review comment"));
        assert!(ctx.contains("Reviewer: bob"));
        assert!(ctx.contains("File path: src/cache.rs"));
        assert!(ctx.contains("Original comment: please rename this variable to x"));
        assert!(ctx.contains("Diff hunk (truncated):\n@@ -1,3 +1,4 @@\n+let y = 1;"));
    }

    #[test]
    fn test_issue_comment_context_mentions_whole_pr() {
        let mut payload = base_payload(EventKind::IssueComment);
        payload.comment_body = Some("why is this needed?".to_string());

        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(ctx.contains("Commenter: bob"));
        assert!(ctx.contains("Comment text: why is this needed?"));
        assert!(ctx.contains("not tied to a specific line of code"));
    }

    #[test]
    fn test_review_context_uses_review_limit() {
        let mut payload = base_payload(EventKind::Review);
        payload.review_state = Some("changes_requested".to_string());
        payload.review_body = Some("x".repeat(50));

        let limits = ClipLimits {
            review: 10,
            ..ClipLimits::default()
        };
        let ctx = build_llm_context(&payload, &limits);
        assert!(ctx.contains("State: changes_requested"));
        assert!(ctx.contains(&format!("Review body: {}{}", "x".repeat(10), TRUNCATION_MARKER)));
    }

    #[test]
    fn test_wizard_context_has_task() {
        let payload = base_payload(EventKind::WizardReviewCommand);
        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(ctx.contains("Requester: bob"));
        assert!(ctx.contains("Task: Perform comprehensive code review of all changes"));
    }

    #[test]
    fn test_other_kind_without_text_has_no_event_section() {
        let payload = base_payload(EventKind::Other("discussion".to_string()));
        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(!ctx.contains("Event:"));

        let mut payload = base_payload(EventKind::Other("discussion".to_string()));
        payload.review_body = Some("hmm".to_string());
        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(ctx.contains("Event: discussion\nUser: bob\nComment: hmm"));
    }

    #[test]
    fn test_absent_fields_do_not_panic() {
        let payload = EventPayload::new(EventKind::ReviewComment, 1, "octo/widgets");
        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(ctx.contains("PR: #1 — "));
        assert!(ctx.contains("File path: \n"));
        assert!(ctx.contains("PR author: (unknown)"));
        assert!(ctx.contains("Reviewer: (unknown)"));
        assert!(!ctx.contains("None"));
    }

    #[test]
    fn test_absent_inline_comment_and_file_metadata_is_unknown() {
        let mut payload = base_payload(EventKind::Review);
        payload.review_state = None;
        payload.review_comments = Some(vec![ReviewCommentInfo {
            id: 3,
            body: "nit".to_string(),
            ..ReviewCommentInfo::default()
        }]);
        payload.files = Some(vec![FileInfo {
            filename: "src/lib.rs".to_string(),
            ..FileInfo::default()
        }]);

        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(ctx.contains("State: (unknown)"));
        assert!(ctx.contains("- id=3 file=(unknown) line=(unknown) by (unknown): nit"));
        assert!(ctx.contains("STATUS: (unknown) (+(unknown)/-(unknown), changes=(unknown))"));
        assert!(!ctx.contains("None"));
    }

    #[test]
    fn test_inline_comments_capped_at_five() {
        let mut payload = base_payload(EventKind::Review);
        payload.review_comments = Some(
            (0..8)
                .map(|i| ReviewCommentInfo {
                    id: i,
                    body: format!("comment {}", i),
                    path: Some("src/lib.rs".to_string()),
                    position: Some(i + 100),
                    line: if i == 0 { Some(7) } else { None },
                    user_login: Some("carol".to_string()),
                    ..ReviewCommentInfo::default()
                })
                .collect(),
        );

        let ctx = build_llm_context(&payload, &ClipLimits::default());
        assert!(ctx.contains("- id=0 file=src/lib.rs line=7 by carol: comment 0"));
        assert!(ctx.contains("- id=1 file=src/lib.rs line=101 by carol: comment 1"));
        assert!(ctx.contains("id=4"));
        assert!(!ctx.contains("id=5"));
    }

    #[test]
    fn test_files_capped_at_six_and_patches_clipped() {
        let mut payload = base_payload(EventKind::ReviewComment);
        payload.files = Some(
            (0..9)
                .map(|i| FileInfo {
                    filename: format!("src/file{}.rs", i),
                    status: Some("modified".to_string()),
                    additions: Some(2),
                    deletions: Some(1),
                    changes: Some(3),
                    patch: Some("p".repeat(30)),
                })
                .collect(),
        );
        let limits = ClipLimits {
            patch: 5,
            ..ClipLimits::default()
        };

        let ctx = build_llm_context(&payload, &limits);
        assert!(ctx.contains("Changed files: 9 (showing up to 6 patches, truncated)"));
        assert!(ctx.contains("FILE: src/file5.rs\nSTATUS: modified (+2/-1, changes=3)"));
        assert!(!ctx.contains("src/file6.rs"));
        assert!(ctx.contains(&format!("PATCH:\nppppp{}", TRUNCATION_MARKER)));
    }
}
