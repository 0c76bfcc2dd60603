//! Bounded retry around a single LLM call.
//!
//! Every component that talks to a model goes through [`RetryPolicy::run`];
//! nothing else in the pipeline sleeps or loops.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Substrings (matched against the lower-cased error chain) that mark a
/// failure as worth retrying.
const TRANSIENT_MARKERS: &[&str] = &[
    "503",
    "overloaded",
    "unavailable",
    "resource exhausted",
    "rate limit",
    "quota",
    "429",
    "timeout",
    "timed out",
    "deadline exceeded",
    "connection reset",
    "connection aborted",
    "bad gateway",
    "502",
    "gateway timeout",
    "504",
    "internal error",
    "500",
    "temporarily",
    "try again",
];

/// Floor applied to the running delay before it is grown.
const MIN_BACKOFF_BASE: Duration = Duration::from_millis(50);
const BACKOFF_FACTOR: f64 = 1.5;

/// Whether an error looks like a transient provider failure.
pub fn is_transient(error: &anyhow::Error) -> bool {
    let message = format!("{:#}", error).to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            initial_delay: Duration::from_millis(350),
            max_delay: Duration::from_secs(2),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// The running delay to use after a retry that waited on `delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        self.max_delay
            .min(delay.max(MIN_BACKOFF_BASE).mul_f64(BACKOFF_FACTOR))
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rand::random_range(0.0..=self.jitter.as_secs_f64()))
    }

    /// Run `operation`, retrying transient failures with exponential backoff.
    ///
    /// Fatal failures are returned after the attempt that raised them. A
    /// transient failure on the final attempt is returned as-is.
    pub async fn run<T, F, Fut>(&self, call_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt: u32 = 1;
        let mut delay = self.initial_delay;

        loop {
            info!("[llm] {}: attempt {}/{}", call_name, attempt, max_attempts);

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let transient = is_transient(&error);
            let summary: String = format!("{:#}", error).chars().take(220).collect();
            warn!(
                "[llm] {}: attempt {} failed (transient={}) -> {}",
                call_name, attempt, transient, summary
            );

            if !transient || attempt >= max_attempts {
                return Err(error);
            }

            let sleep_for = self.max_delay.min(delay) + self.sample_jitter();
            info!(
                "[llm] {}: sleeping {:.2}s before retry",
                call_name,
                sleep_for.as_secs_f64()
            );
            tokio::time::sleep(sleep_for).await;

            delay = self.next_delay(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_transient_markers() {
        assert!(is_transient(&anyhow!("Gemini API error: 429 Too Many Requests")));
        assert!(is_transient(&anyhow!("The model is OVERLOADED")));
        assert!(is_transient(&anyhow!("error sending request: operation timed out")));
        assert!(is_transient(&anyhow!("Please try again later")));
        assert!(is_transient(&anyhow!("Service Temporarily unavailable")));
        assert!(is_transient(
            &anyhow!("connection reset by peer").context("Failed to call Gemini API")
        ));

        assert!(!is_transient(&anyhow!("GEMINI_API_KEY is not set")));
        assert!(!is_transient(&anyhow!("Gemini API error: 401 Unauthorized")));
        assert!(!is_transient(&anyhow!("400 Bad Request: invalid argument")));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = Vec::new();
        for _ in 0..8 {
            delay = policy.next_delay(delay);
            seen.push(delay);
        }

        assert!((seen[0].as_secs_f64() - 0.525).abs() < 1e-6);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_from_zero_uses_floor() {
        let policy = RetryPolicy {
            initial_delay: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let next = policy.next_delay(Duration::ZERO);
        assert!((next.as_secs_f64() - 0.075).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_always_transient_exhausts_attempts() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result: Result<()> = policy
            .run("always_503", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("503 Service Unavailable"))
            })
            .await;

        assert!(result.unwrap_err().to_string().contains("503"));
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(12);

        let result: Result<()> = policy
            .run("fatal", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("invalid API key"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(12);

        let result = policy
            .run("flaky", || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 4 {
                    Err(anyhow!("rate limit exceeded"))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 4);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_zero_max_attempts_still_tries_once() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(0);

        let result: Result<()> = policy
            .run("zero", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("timeout"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy {
            jitter: Duration::from_millis(10),
            ..RetryPolicy::default()
        };
        for _ in 0..100 {
            assert!(policy.sample_jitter() <= Duration::from_millis(10));
        }
    }
}
