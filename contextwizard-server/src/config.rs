use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use contextwizard_core::llm::ProviderConfig;
use contextwizard_core::{ClipLimits, LlmProvider, ModelConfig, PipelineConfig, RetryPolicy, Thresholds};

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub pipeline: PipelineConfig,
    pub port: u16,
    pub pending_comments_db: PathBuf,
    pub recording_enabled: bool,
    pub recording_log_path: String,
}

fn parse_or<T>(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a valid number, got '{}'", name, value)),
        None => Ok(default),
    }
}

fn seconds_or(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration> {
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(value) => {
            let secs: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds, got '{}'", name, value))?;
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("{} must be a non-negative number of seconds", name))
        }
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider: LlmProvider = non_empty("LLM_PROVIDER")
            .unwrap_or_else(|| "gemini".to_string())
            .parse()
            .context("LLM_PROVIDER must be 'gemini' or 'openai'")?;

        let (model_var, code_model_var, default_model) = match provider {
            LlmProvider::Gemini => ("GEMINI_MODEL", "GEMINI_CODE_MODEL", "gemini-2.5-flash"),
            LlmProvider::OpenAi => ("OPENAI_MODEL", "OPENAI_CODE_MODEL", "gpt-4.1-mini"),
        };
        let models = ModelConfig::new(
            non_empty(model_var).unwrap_or_else(|| default_model.to_string()),
            non_empty(code_model_var).unwrap_or_else(|| default_model.to_string()),
        );

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(lookup, "GEMINI_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay: seconds_or(lookup, "GEMINI_RETRY_INITIAL_DELAY", defaults.initial_delay)?,
            max_delay: seconds_or(lookup, "GEMINI_RETRY_MAX_DELAY", defaults.max_delay)?,
            jitter: seconds_or(lookup, "GEMINI_RETRY_JITTER_SEC", defaults.jitter)?,
        };

        let default_limits = ClipLimits::default();
        let limits = ClipLimits {
            pr_body: parse_or(lookup, "MAX_PR_BODY_LENGTH", default_limits.pr_body)?,
            comment: parse_or(lookup, "MAX_COMMENT_LENGTH", default_limits.comment)?,
            review: parse_or(lookup, "MAX_REVIEW_LENGTH", default_limits.review)?,
            diff_hunk: parse_or(lookup, "MAX_DIFF_HUNK_LENGTH", default_limits.diff_hunk)?,
            patch: parse_or(lookup, "MAX_PATCH_LENGTH", default_limits.patch)?,
            inline_comment: parse_or(
                lookup,
                "MAX_INLINE_COMMENT_LENGTH",
                default_limits.inline_comment,
            )?,
        };

        let default_thresholds = Thresholds::default();
        let thresholds = Thresholds {
            good_change: parse_or(
                lookup,
                "GOOD_CHANGE_CONFIDENCE_THRESHOLD",
                default_thresholds.good_change,
            )?,
            bad_question: parse_or(
                lookup,
                "BAD_QUESTION_CONFIDENCE_THRESHOLD",
                default_thresholds.bad_question,
            )?,
            bad_change: parse_or(
                lookup,
                "BAD_CHANGE_CONFIDENCE_THRESHOLD",
                default_thresholds.bad_change,
            )?,
        };

        let request_timeout = Duration::from_secs(parse_or(lookup, "LLM_REQUEST_TIMEOUT_SECS", 120u64)?);

        let port = parse_or(lookup, "PORT", 10000u16)?;

        let recording_enabled = lookup("RECORDING_ENABLED")
            .unwrap_or_else(|| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let recording_log_path =
            non_empty("RECORDING_LOG_PATH").unwrap_or_else(|| "recordings.jsonl".to_string());

        let pending_comments_db = non_empty("PENDING_COMMENTS_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./pending_comments.db"));

        Ok(Config {
            provider: ProviderConfig {
                provider,
                api_key: non_empty(provider.api_key_var()),
                base_url: None,
                request_timeout,
            },
            pipeline: PipelineConfig {
                models,
                retry,
                limits,
                thresholds,
            },
            port,
            pending_comments_db,
            recording_enabled,
            recording_log_path,
        })
    }
}
