use serde_json::Value;
use std::collections::HashMap;

/// Headers whose values never reach the recording log.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "openai-api-key",
    "set-cookie",
    "x-api-key",
    "x-goog-api-key",
];

const SENSITIVE_FIELDS: &[&str] = &["api_key", "key", "password", "secret", "token"];

pub struct Sanitizer;

impl Sanitizer {
    pub fn is_sensitive_header(header_name: &str) -> bool {
        let lower = header_name.to_lowercase();
        SENSITIVE_HEADERS.contains(&lower.as_str())
    }

    pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(key, value)| {
                let value = if Self::is_sensitive_header(key) {
                    "[REDACTED]".to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Redact secret-looking fields anywhere in a JSON document.
    pub fn sanitize_json(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        let val = if SENSITIVE_FIELDS.contains(&key.as_str()) {
                            Value::String("[REDACTED]".to_string())
                        } else {
                            Self::sanitize_json(val)
                        };
                        (key.clone(), val)
                    })
                    .collect(),
            ),
            Value::Array(arr) => Value::Array(arr.iter().map(Self::sanitize_json).collect()),
            _ => value.clone(),
        }
    }

    /// Drop `key=` query parameters from a URL string.
    pub fn sanitize_url(url: &str) -> String {
        match url::Url::parse(url) {
            Ok(mut parsed) => {
                let kept: Vec<(String, String)> = parsed
                    .query_pairs()
                    .filter(|(k, _)| !SENSITIVE_FIELDS.contains(&k.as_ref()))
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                if kept.is_empty() {
                    parsed.set_query(None);
                } else {
                    parsed.query_pairs_mut().clear().extend_pairs(kept);
                }
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_are_redacted_case_insensitively() {
        let mut headers = HashMap::new();
        headers.insert("X-Goog-Api-Key".to_string(), "secret".to_string());
        headers.insert("Authorization".to_string(), "Bearer sk-123".to_string());
        headers.insert("content-type".to_string(), "application/json".to_string());

        let sanitized = Sanitizer::sanitize_headers(&headers);
        assert_eq!(sanitized["X-Goog-Api-Key"], "[REDACTED]");
        assert_eq!(sanitized["Authorization"], "[REDACTED]");
        assert_eq!(sanitized["content-type"], "application/json");
    }

    #[test]
    fn test_nested_json_is_redacted() {
        let value = json!({
            "comment_body": "please fix",
            "auth": {"token": "ghp_abc"},
            "items": [{"api_key": "k"}]
        });
        let sanitized = Sanitizer::sanitize_json(&value);
        assert_eq!(sanitized["comment_body"], "please fix");
        assert_eq!(sanitized["auth"]["token"], "[REDACTED]");
        assert_eq!(sanitized["items"][0]["api_key"], "[REDACTED]");
    }

    #[test]
    fn test_url_key_parameter_is_dropped() {
        let url = "https://example.com/v1beta/models/m:generateContent?key=abc&alt=json";
        let sanitized = Sanitizer::sanitize_url(url);
        assert!(!sanitized.contains("abc"));
        assert!(sanitized.contains("alt=json"));

        let sanitized = Sanitizer::sanitize_url("https://example.com/x?key=abc");
        assert_eq!(sanitized, "https://example.com/x");
    }
}
