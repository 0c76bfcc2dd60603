//! Optional JSONL recording of inbound review events and outbound LLM calls.

pub mod logger;
pub mod middleware;
pub mod sanitizer;
pub mod types;

pub use logger::{current_analysis, in_analysis, RecordingLogger};
pub use middleware::RecordingMiddleware;
pub use sanitizer::{Sanitizer, SENSITIVE_HEADERS};
pub use types::*;
