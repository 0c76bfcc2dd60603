//! Google Gemini `generateContent` client.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    error_from_response, structured_from_text, Schema, StructuredGenerator, StructuredOutput,
    StructuredRequest, TextGenerator, TextRequest,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: ClientWithMiddleware,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(client: ClientWithMiddleware, api_key: Option<String>, base_url: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    async fn generate(&self, model: &str, request: GenerateContentRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY is not set"))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call Gemini API")?;

        if !response.status().is_success() {
            return Err(error_from_response("Gemini", response).await);
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        response_text(body)
    }
}

fn user_contents(prompt: &str) -> Vec<Content> {
    vec![Content {
        role: Some("user".to_string()),
        parts: vec![Part {
            text: Some(prompt.to_string()),
        }],
    }]
}

/// Concatenated text of the first candidate. A blocked prompt is an error;
/// a candidate with no text yields an empty string.
fn response_text(body: GenerateContentResponse) -> Result<String> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(anyhow!("Gemini blocked the prompt: {}", reason));
    }

    let text = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

/// Gemini accepts an OpenAPI subset: upper-case type names and no
/// `additionalProperties`.
fn gemini_schema(schema: &Schema) -> Result<Value> {
    let mut value = serde_json::to_value(schema).context("Failed to serialize response schema")?;
    adapt_schema_value(&mut value);
    Ok(value)
}

fn adapt_schema_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("additionalProperties");
            if let Some(Value::String(t)) = map.get_mut("type") {
                *t = t.to_uppercase();
            }
            if let Some(Value::Object(properties)) = map.get_mut("properties") {
                properties.values_mut().for_each(adapt_schema_value);
            }
            if let Some(items) = map.get_mut("items") {
                adapt_schema_value(items);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(adapt_schema_value),
        _ => {}
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, request: &TextRequest) -> Result<String> {
        let body = GenerateContentRequest {
            contents: user_contents(&request.prompt),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                response_mime_type: None,
                response_schema: None,
            },
        };
        self.generate(&request.model, body).await
    }
}

#[async_trait]
impl StructuredGenerator for GeminiClient {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<StructuredOutput> {
        let body = GenerateContentRequest {
            contents: user_contents(&request.prompt),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: None,
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(gemini_schema(&request.schema.schema)?),
            },
        };
        let text = self.generate(&request.model, body).await?;
        Ok(structured_from_text(text))
    }
}
