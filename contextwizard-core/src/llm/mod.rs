//! LLM capabilities and their provider implementations.
//!
//! The pipeline only sees the two capability traits. Which provider sits
//! behind them is decided once, in [`LlmBackend::connect`].

mod gemini;
mod openai;
pub mod retry;

pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use retry::{is_transient, RetryPolicy};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::recording::{RecordingLogger, RecordingMiddleware, ServiceType};

/// A free-text generation request.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

/// A request for JSON conforming to `schema`.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub schema: JsonSchema,
}

/// What a provider hands back for a structured request: its own parse of the
/// JSON when it made one, and the raw text either way.
#[derive(Debug, Clone, Default)]
pub struct StructuredOutput {
    pub parsed: Option<serde_json::Value>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonSchema {
    pub name: String,
    pub schema: Schema,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, SchemaProperty>,
    pub required: Vec<String>,
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaProperty {
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaProperty {
    pub fn new(property_type: &str) -> Self {
        Self {
            property_type: property_type.to_string(),
            enum_values: None,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = Some(values);
        self
    }
}

/// "Produce text given a prompt."
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, request: &TextRequest) -> Result<String>;
}

/// "Produce a value conforming to a schema given a prompt."
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<StructuredOutput>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
    OpenAi,
}

impl LlmProvider {
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "GEMINI_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn service_type(&self) -> ServiceType {
        match self {
            LlmProvider::Gemini => ServiceType::Gemini,
            LlmProvider::OpenAi => ServiceType::OpenAi,
        }
    }
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAi),
            other => bail!("unsupported LLM provider '{}'; expected gemini or openai", other),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Gemini => write!(f, "gemini"),
            LlmProvider::OpenAi => write!(f, "openai"),
        }
    }
}

/// How to reach the configured provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: LlmProvider,
    /// Missing keys are reported on the first call, not at startup.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout: Duration,
}

/// The pair of capabilities the pipeline is built from.
#[derive(Clone)]
pub struct LlmBackend {
    pub text: Arc<dyn TextGenerator>,
    pub structured: Arc<dyn StructuredGenerator>,
}

impl LlmBackend {
    /// Use one client for both capabilities.
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: TextGenerator + StructuredGenerator + 'static,
    {
        Self {
            text: client.clone(),
            structured: client,
        }
    }

    /// Build the provider client selected by `config`.
    pub fn connect(config: &ProviderConfig, recording_logger: Option<RecordingLogger>) -> Result<Self> {
        let http = create_llm_http_client(
            config.provider.service_type(),
            config.request_timeout,
            recording_logger,
        )?;

        let backend = match config.provider {
            LlmProvider::Gemini => Self::from_client(Arc::new(GeminiClient::new(
                http,
                config.api_key.clone(),
                config.base_url.clone(),
            ))),
            LlmProvider::OpenAi => Self::from_client(Arc::new(OpenAIClient::new(
                http,
                config.api_key.clone(),
                config.base_url.clone(),
            ))),
        };

        Ok(backend)
    }
}

pub fn create_llm_http_client(
    service_type: ServiceType,
    timeout: Duration,
    recording_logger: Option<RecordingLogger>,
) -> Result<ClientWithMiddleware> {
    let client = Client::builder()
        .user_agent(concat!("contextwizard/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let mut builder = ClientBuilder::new(client);

    if let Some(logger) = recording_logger {
        builder = builder.with(RecordingMiddleware::new(logger, service_type));
    }

    Ok(builder.build())
}

/// Read an error response into a message that carries the HTTP status, so the
/// retry policy can recognise transient failures.
pub(crate) async fn error_from_response(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read error body: {}>", e));
    let body: String = body.chars().take(500).collect();
    anyhow::anyhow!("{} API error: {} - {}", provider, status, body)
}

/// Providers parse their JSON text eagerly; failures are left to the caller.
pub(crate) fn structured_from_text(text: String) -> StructuredOutput {
    StructuredOutput {
        parsed: serde_json::from_str(text.trim()).ok(),
        text,
    }
}
