//! Scripted generators for exercising the pipeline without a provider.
//!
//! Each fake replays a queue of canned results in order and remembers the
//! requests it was given. An exhausted queue yields a fatal error.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::llm::{
    LlmBackend, StructuredGenerator, StructuredOutput, StructuredRequest, TextGenerator,
    TextRequest,
};

#[derive(Default)]
pub struct ScriptedText {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<TextRequest>>,
}

impl ScriptedText {
    pub fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<TextRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedText {
    async fn generate_text(&self, request: &TextRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.responses
            .lock()
            .map_err(|_| anyhow!("scripted text generator poisoned"))?
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted text generator has no responses left")))
    }
}

#[derive(Default)]
pub struct ScriptedStructured {
    responses: Mutex<VecDeque<Result<StructuredOutput>>>,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedStructured {
    pub fn new(responses: Vec<Result<StructuredOutput>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Responses that arrive pre-parsed, as a provider with native JSON
    /// support would return them.
    pub fn from_values(values: Vec<Value>) -> Arc<Self> {
        Self::new(
            values
                .into_iter()
                .map(|value| {
                    Ok(StructuredOutput {
                        text: value.to_string(),
                        parsed: Some(value),
                    })
                })
                .collect(),
        )
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedStructured {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<StructuredOutput> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        self.responses
            .lock()
            .map_err(|_| anyhow!("scripted structured generator poisoned"))?
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("scripted structured generator has no responses left")))
    }
}

/// A backend assembled from two scripted fakes, keeping handles on both so
/// tests can inspect what was asked.
pub struct ScriptedBackend {
    pub text: Arc<ScriptedText>,
    pub structured: Arc<ScriptedStructured>,
}

impl ScriptedBackend {
    pub fn new(text: Vec<Result<String>>, structured: Vec<Value>) -> Self {
        Self {
            text: ScriptedText::new(text),
            structured: ScriptedStructured::from_values(structured),
        }
    }

    pub fn backend(&self) -> LlmBackend {
        LlmBackend {
            text: self.text.clone(),
            structured: self.structured.clone(),
        }
    }

    pub fn total_calls(&self) -> usize {
        self.text.call_count() + self.structured.call_count()
    }
}

/// JSON for a classification the structured fake can replay.
pub fn classification_json(category: &str, confidence: f64) -> Value {
    serde_json::json!({
        "category": category,
        "needs_reply": true,
        "needs_clarification": false,
        "confidence": confidence,
        "short_reason": format!("scripted {}", category.to_lowercase()),
    })
}
