//! Structured LLM outputs and the JSON schemas requested for them.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::llm::{
    JsonSchema, RetryPolicy, Schema, SchemaProperty, StructuredGenerator, StructuredOutput,
    StructuredRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Praise,
    GoodChange,
    BadChange,
    GoodQuestion,
    BadQuestion,
    Unknown,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Praise,
        Category::GoodChange,
        Category::BadChange,
        Category::GoodQuestion,
        Category::BadQuestion,
        Category::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Praise => "PRAISE",
            Category::GoodChange => "GOOD_CHANGE",
            Category::BadChange => "BAD_CHANGE",
            Category::GoodQuestion => "GOOD_QUESTION",
            Category::BadQuestion => "BAD_QUESTION",
            Category::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Prompt contract: true only for GOOD_CHANGE, BAD_CHANGE, BAD_QUESTION.
    pub needs_reply: bool,
    /// Prompt contract: true only for BAD_CHANGE, BAD_QUESTION.
    pub needs_clarification: bool,
    pub confidence: f64,
    pub short_reason: String,
}

impl Classification {
    /// Stand-in classification used when a pipeline stage fails.
    pub fn unknown_fallback(reason: impl Into<String>) -> Self {
        Self {
            category: Category::Unknown,
            needs_reply: true,
            needs_clarification: false,
            confidence: 0.0,
            short_reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifiedQuestion {
    pub clarified_question: String,
    pub confidence: f64,
    pub short_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifiedChange {
    /// Actionable restatement; may contain placeholders like `<which function?>`.
    pub clarified_request: String,
    pub confidence: f64,
    pub short_reason: String,
}

/// A value the model is asked to return as schema-conforming JSON.
pub trait StructuredResponse: DeserializeOwned {
    const SCHEMA_NAME: &'static str;

    fn schema() -> Schema;

    fn validate(&self) -> Result<()>;

    fn json_schema() -> JsonSchema {
        JsonSchema {
            name: Self::SCHEMA_NAME.to_string(),
            schema: Self::schema(),
            strict: true,
        }
    }
}

fn check_confidence(confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        bail!("confidence {} is outside [0, 1]", confidence);
    }
    Ok(())
}

fn string_property(description: &str) -> SchemaProperty {
    SchemaProperty::new("string").with_description(description)
}

fn confidence_property() -> SchemaProperty {
    SchemaProperty::new("number").with_description("Confidence between 0.0 and 1.0.")
}

fn object_schema(properties: Vec<(&str, SchemaProperty)>) -> Schema {
    let required = properties.iter().map(|(name, _)| name.to_string()).collect();
    Schema {
        schema_type: "object".to_string(),
        properties: properties
            .into_iter()
            .map(|(name, property)| (name.to_string(), property))
            .collect::<BTreeMap<_, _>>(),
        required,
        additional_properties: Some(false),
    }
}

impl StructuredResponse for Classification {
    const SCHEMA_NAME: &'static str = "Classification";

    fn schema() -> Schema {
        object_schema(vec![
            (
                "category",
                SchemaProperty::new("string")
                    .with_enum(Category::ALL.iter().map(|c| c.as_str().to_string()).collect()),
            ),
            (
                "needs_reply",
                SchemaProperty::new("boolean")
                    .with_description("True only for GOOD_CHANGE, BAD_CHANGE, BAD_QUESTION."),
            ),
            (
                "needs_clarification",
                SchemaProperty::new("boolean")
                    .with_description("True only for BAD_CHANGE or BAD_QUESTION."),
            ),
            ("confidence", confidence_property()),
            (
                "short_reason",
                string_property("One short sentence. No chain-of-thought."),
            ),
        ])
    }

    fn validate(&self) -> Result<()> {
        check_confidence(self.confidence)
    }
}

impl StructuredResponse for ClarifiedQuestion {
    const SCHEMA_NAME: &'static str = "ClarifiedQuestion";

    fn schema() -> Schema {
        object_schema(vec![
            (
                "clarified_question",
                string_property("A rewritten, clarified version of the original question."),
            ),
            ("confidence", confidence_property()),
            (
                "short_reason",
                string_property("One short sentence on what was ambiguous / what you clarified."),
            ),
        ])
    }

    fn validate(&self) -> Result<()> {
        check_confidence(self.confidence)
    }
}

impl StructuredResponse for ClarifiedChange {
    const SCHEMA_NAME: &'static str = "ClarifiedChange";

    fn schema() -> Schema {
        object_schema(vec![
            (
                "clarified_request",
                string_property(
                    "A rewritten, clarified change request. Must be actionable but may contain placeholders like <which function?>.",
                ),
            ),
            ("confidence", confidence_property()),
            (
                "short_reason",
                string_property("One short sentence on what was unclear / what you clarified."),
            ),
        ])
    }

    fn validate(&self) -> Result<()> {
        check_confidence(self.confidence)
    }
}

/// Turn a provider's structured output into a validated `T`.
///
/// Uses the provider's pre-parsed value when there is one, otherwise parses
/// the raw text as JSON.
pub fn parse_structured<T: StructuredResponse>(output: StructuredOutput) -> Result<T> {
    let value = match output.parsed {
        Some(value) => value,
        None => serde_json::from_str(output.text.trim()).with_context(|| {
            format!("{} response is not valid JSON", T::SCHEMA_NAME)
        })?,
    };

    let parsed: T = serde_json::from_value(value)
        .with_context(|| format!("{} response does not match schema", T::SCHEMA_NAME))?;
    parsed
        .validate()
        .map_err(|e| anyhow!("{} response failed validation: {}", T::SCHEMA_NAME, e))?;

    Ok(parsed)
}

/// One structured call under the retry policy, parsed and validated after the
/// retries are over. A malformed response is not retried.
pub(crate) async fn generate_validated<T: StructuredResponse>(
    generator: &dyn StructuredGenerator,
    retry: &RetryPolicy,
    call_name: &str,
    model: &str,
    prompt: String,
) -> Result<T> {
    let request = StructuredRequest {
        model: model.to_string(),
        prompt,
        temperature: 0.2,
        schema: T::json_schema(),
    };
    let output = retry
        .run(call_name, || generator.generate_structured(&request))
        .await?;
    parse_structured(output)
}
