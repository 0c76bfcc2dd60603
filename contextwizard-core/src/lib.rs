pub mod classify;
pub mod clarify;
pub mod config;
pub mod context;
pub mod format;
pub mod llm;
pub mod payload;
pub mod pipeline;
pub mod recording;
pub mod schema;
pub mod suggest;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wizard;

pub use config::{ClipLimits, ModelConfig, PipelineConfig, Thresholds};
pub use llm::{
    LlmBackend, LlmProvider, RetryPolicy, StructuredGenerator, StructuredOutput,
    StructuredRequest, TextGenerator, TextRequest,
};
pub use payload::{EventKind, EventPayload, FileInfo, ReviewCommentInfo};
pub use pipeline::ReviewPipeline;
pub use recording::{
    CorrelationId, Direction, EventType, RecordedEvent, RecordingLogger, RecordingMiddleware,
    Sanitizer, ServiceType,
};
pub use schema::{Category, ClarifiedChange, ClarifiedQuestion, Classification};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Short version string: the deployment git hash when provided, otherwise the
/// commit detected at build time.
pub fn get_version() -> String {
    let hash = option_env!("CONTEXTWIZARD_GIT_HASH").or(built_info::GIT_COMMIT_HASH);
    match hash {
        Some(git_hash) if git_hash.len() >= 8 => git_hash[..8].to_string(),
        Some(git_hash) => git_hash.to_string(),
        None => "unknown".to_string(),
    }
}
