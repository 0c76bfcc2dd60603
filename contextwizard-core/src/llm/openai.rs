//! OpenAI chat-completions client.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use super::{
    error_from_response, structured_from_text, JsonSchema, StructuredGenerator, StructuredOutput,
    StructuredRequest, TextGenerator, TextRequest,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIClient {
    client: ClientWithMiddleware,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: &'a JsonSchema,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

impl OpenAIClient {
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

    async fn complete(&self, request: &ChatCompletionRequest<'_>) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await
            .context("Failed to call OpenAI API")?;

        if !response.status().is_success() {
            return Err(error_from_response("OpenAI", response).await);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        Ok(first_message_content(body))
    }
}

fn user_message(prompt: &str) -> Vec<ChatMessage> {
    vec![ChatMessage {
        role: "user".to_string(),
        content: Some(prompt.to_string()),
    }]
}

fn first_message_content(body: ChatCompletionResponse) -> String {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default()
}

#[async_trait]
impl TextGenerator for OpenAIClient {
    async fn generate_text(&self, request: &TextRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: user_message(&request.prompt),
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
            response_format: None,
        };
        self.complete(&body).await
    }
}

#[async_trait]
impl StructuredGenerator for OpenAIClient {
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<StructuredOutput> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: user_message(&request.prompt),
            temperature: request.temperature,
            max_tokens: None,
            response_format: Some(ResponseFormat {
                format_type: "json_schema",
                json_schema: &request.schema,
            }),
        };
        let text = self.complete(&body).await?;
        Ok(structured_from_text(text))
    }
}
