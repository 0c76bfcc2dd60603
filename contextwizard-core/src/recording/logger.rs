//! Background JSONL sink for recorded events.
//!
//! Events travel over a bounded channel. When the writer falls behind, new
//! events are dropped and counted instead of queueing without limit.

use super::sanitizer::Sanitizer;
use super::types::{CorrelationId, Direction, EventType, RecordedEvent};
use crate::payload::EventPayload;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

const CHANNEL_CAPACITY: usize = 1024;
const WRITE_BATCH: usize = 64;
const ANALYZE_OPERATION: &str = "analyze_review";

tokio::task_local! {
    static ANALYSIS_ID: CorrelationId;
}

/// Run `future` with `id` as the correlation id for every LLM call it records.
pub async fn in_analysis<F: Future>(id: CorrelationId, future: F) -> F::Output {
    ANALYSIS_ID.scope(id, future).await
}

/// The correlation id of the analysis running on this task, if any.
pub fn current_analysis() -> Option<CorrelationId> {
    ANALYSIS_ID.try_with(|id| id.clone()).ok()
}

#[derive(Clone)]
pub struct RecordingLogger {
    sender: mpsc::Sender<RecordedEvent>,
    dropped: Arc<AtomicU64>,
}

impl RecordingLogger {
    /// Open `log_file_path` for appending and start the writer task.
    pub async fn open(log_file_path: PathBuf) -> Result<Self> {
        if let Some(parent) = log_file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .await
            .with_context(|| format!("Failed to open recording log {}", log_file_path.display()))?;
        info!("Recording events to {}", log_file_path.display());

        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(write_events(BufWriter::new(file), receiver));

        Ok(Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn record(&self, event: RecordedEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Recording channel full; dropped {} event for {} ({} dropped so far)",
                    event.operation, event.correlation_id, dropped
                );
            }
            Err(TrySendError::Closed(event)) => {
                warn!(
                    "Recording writer stopped; discarded {} event for {}",
                    event.operation, event.correlation_id
                );
            }
        }
    }

    /// Events discarded because the writer could not keep up.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record an inbound review event, sanitized, tagged with its PR.
    pub fn record_review_request(&self, correlation_id: &CorrelationId, payload: &EventPayload) {
        let data = serde_json::to_value(payload)
            .map(|v| Sanitizer::sanitize_json(&v))
            .unwrap_or(serde_json::Value::Null);
        self.record(
            RecordedEvent::new(
                correlation_id.as_str(),
                EventType::ReviewEventReceived,
                Direction::Request,
                ANALYZE_OPERATION,
                data,
            )
            .with_metadata("repo", payload.repo_full_name.clone())
            .with_metadata("pr_number", payload.pr_number.to_string())
            .with_metadata("kind", payload.kind.to_string()),
        );
    }

    pub fn record_review_response(
        &self,
        correlation_id: &CorrelationId,
        payload: &EventPayload,
        comment: &str,
    ) {
        self.record(
            RecordedEvent::new(
                correlation_id.as_str(),
                EventType::ReviewEventReceived,
                Direction::Response,
                ANALYZE_OPERATION,
                serde_json::json!({ "comment": comment }),
            )
            .with_metadata("kind", payload.kind.to_string())
            .with_metadata("comment_chars", comment.chars().count().to_string()),
        );
    }

    #[cfg(test)]
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<RecordedEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let logger = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (logger, receiver)
    }
}

async fn write_events(mut out: BufWriter<File>, mut receiver: mpsc::Receiver<RecordedEvent>) {
    let mut batch = Vec::with_capacity(WRITE_BATCH);
    while receiver.recv_many(&mut batch, WRITE_BATCH).await > 0 {
        for event in batch.drain(..) {
            match serde_json::to_vec(&event) {
                Ok(mut line) => {
                    line.push(b'\n');
                    if let Err(e) = out.write_all(&line).await {
                        warn!("Failed to write recorded event {}: {}", event.correlation_id, e);
                    }
                }
                Err(e) => warn!(
                    "Failed to serialize recorded event {}: {}",
                    event.correlation_id, e
                ),
            }
        }
        if let Err(e) = out.flush().await {
            warn!("Failed to flush recording log: {}", e);
        }
    }
    debug!("Recording writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::EventKind;
    use std::time::Duration;

    fn payload() -> EventPayload {
        let mut payload = EventPayload::new(EventKind::ReviewComment, 7, "acme/widgets");
        payload.comment_body = Some("rename this".to_string());
        payload
    }

    #[tokio::test]
    async fn test_review_events_are_written_as_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("recordings.jsonl");
        let logger = RecordingLogger::open(path.clone()).await.unwrap();
        let id = CorrelationId::from("analysis-1");

        logger.record_review_request(&id, &payload());
        logger.record_review_response(&id, &payload(), "```diff\n```");

        let mut lines = Vec::new();
        for _ in 0..100 {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                lines = contents.lines().map(str::to_string).collect();
                if lines.len() == 2 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(lines.len(), 2);
        let request: RecordedEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(request.correlation_id, "analysis-1");
        assert_eq!(request.direction, Direction::Request);
        assert_eq!(request.metadata["pr_number"], "7");
        assert_eq!(request.data["comment_body"], "rename this");

        let response: RecordedEvent = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(response.direction, Direction::Response);
        assert_eq!(response.metadata["comment_chars"], "11");
    }

    #[tokio::test]
    async fn test_open_reports_unusable_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().join("recordings.jsonl");

        let err = RecordingLogger::open(path).await.err().unwrap();
        assert!(err.to_string().contains("Failed to create"));
    }

    #[tokio::test]
    async fn test_full_channel_drops_and_counts() {
        let (logger, mut receiver) = RecordingLogger::channel(1);
        let id = CorrelationId::from("busy");

        logger.record_review_request(&id, &payload());
        logger.record_review_request(&id, &payload());
        logger.clone().record_review_request(&id, &payload());

        assert_eq!(logger.dropped_events(), 2);
        assert_eq!(receiver.recv().await.unwrap().correlation_id, "busy");
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_analysis_scope_sets_current_id() {
        assert!(current_analysis().is_none());

        let seen = in_analysis(CorrelationId::from("scoped"), async {
            current_analysis().map(|id| id.as_str().to_string())
        })
        .await;

        assert_eq!(seen.as_deref(), Some("scoped"));
        assert!(current_analysis().is_none());
    }
}
