use super::logger::current_analysis;
use super::sanitizer::Sanitizer;
use super::types::CorrelationId;
use super::{Direction, EventType, RecordedEvent, RecordingLogger, ServiceType};
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result as MiddlewareResult};
use std::collections::HashMap;

/// Records every outbound LLM request and its response status.
///
/// Events carry the correlation id of the enclosing analysis (or a fresh one
/// for calls made outside any analysis). The id stays local: nothing is added
/// to the request sent to the provider.
pub struct RecordingMiddleware {
    logger: RecordingLogger,
    service_type: ServiceType,
}

impl RecordingMiddleware {
    pub fn new(logger: RecordingLogger, service_type: ServiceType) -> Self {
        Self {
            logger,
            service_type,
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RecordingMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> MiddlewareResult<Response> {
        let id = extensions
            .get::<CorrelationId>()
            .cloned()
            .or_else(current_analysis)
            .unwrap_or_else(CorrelationId::generate);
        let correlation_id = id.as_str();

        let request_data = extract_request_data(&req);
        self.record(
            correlation_id,
            Direction::Request,
            format!("{} {}", request_data.method, extract_path(&request_data.url)),
            serde_json::to_value(&request_data).unwrap_or(serde_json::Value::Null),
        );

        let response = next.run(req, extensions).await;

        match &response {
            Ok(resp) => {
                let response_data = extract_response_data(resp);
                self.record(
                    correlation_id,
                    Direction::Response,
                    format!("response_{}", response_data.status_code),
                    serde_json::to_value(&response_data).unwrap_or(serde_json::Value::Null),
                );
            }
            Err(err) => {
                self.record(
                    correlation_id,
                    Direction::Response,
                    "error".to_string(),
                    serde_json::json!({
                        "error": err.to_string(),
                        "error_type": format!("{:?}", err)
                    }),
                );
            }
        }

        response
    }
}

impl RecordingMiddleware {
    fn record(
        &self,
        correlation_id: &str,
        direction: Direction,
        operation: String,
        data: serde_json::Value,
    ) {
        let event = RecordedEvent::new(
            correlation_id,
            EventType::LlmApiCall,
            direction,
            operation,
            data,
        )
        .with_metadata("service", format!("{:?}", self.service_type));
        self.logger.record(event);
    }
}

fn header_map(headers: &http::HeaderMap) -> HashMap<String, String> {
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
    Sanitizer::sanitize_headers(&headers)
}

fn extract_request_data(request: &Request) -> RequestData {
    let body = match request.body() {
        Some(body) => match body.as_bytes() {
            Some(bytes) if bytes.len() > 10_000 => format!("[LARGE_BODY_{}b]", bytes.len()),
            Some(bytes) => match serde_json::from_slice::<serde_json::Value>(bytes) {
                Ok(json) => Sanitizer::sanitize_json(&json).to_string(),
                Err(_) => String::from_utf8_lossy(bytes).into_owned(),
            },
            None => "[STREAM_BODY]".to_string(),
        },
        None => "[NO_BODY]".to_string(),
    };

    RequestData {
        method: request.method().to_string(),
        url: Sanitizer::sanitize_url(request.url().as_str()),
        headers: header_map(request.headers()),
        body,
    }
}

fn extract_response_data(response: &Response) -> ResponseData {
    ResponseData {
        status_code: response.status().as_u16(),
        headers: header_map(response.headers()),
        body_size: response.content_length().unwrap_or(0),
    }
}

#[derive(Debug, serde::Serialize)]
struct RequestData {
    method: String,
    url: String,
    headers: HashMap<String, String>,
    body: String,
}

#[derive(Debug, serde::Serialize)]
struct ResponseData {
    status_code: u16,
    headers: HashMap<String, String>,
    body_size: u64,
}

fn extract_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::in_analysis;
    use reqwest_middleware::ClientBuilder;
    use std::sync::{Arc, Mutex};

    /// Stands in for the provider: keeps the outbound headers and answers 200.
    struct Upstream {
        headers: Arc<Mutex<Option<http::HeaderMap>>>,
    }

    #[async_trait::async_trait]
    impl Middleware for Upstream {
        async fn handle(
            &self,
            req: Request,
            _extensions: &mut Extensions,
            _next: Next<'_>,
        ) -> MiddlewareResult<Response> {
            *self.headers.lock().unwrap() = Some(req.headers().clone());
            let response = http::Response::builder()
                .status(200)
                .body("{}")
                .unwrap();
            Ok(Response::from(response))
        }
    }

    fn recording_client(
        logger: RecordingLogger,
    ) -> (
        reqwest_middleware::ClientWithMiddleware,
        Arc<Mutex<Option<http::HeaderMap>>>,
    ) {
        let headers = Arc::new(Mutex::new(None));
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RecordingMiddleware::new(logger, ServiceType::Gemini))
            .with(Upstream {
                headers: headers.clone(),
            })
            .build();
        (client, headers)
    }

    #[tokio::test]
    async fn test_analysis_id_is_recorded_but_not_sent_upstream() {
        let (logger, mut events) = RecordingLogger::channel(8);
        let (client, sent_headers) = recording_client(logger);

        let response = in_analysis(CorrelationId::from("analysis-42"), async {
            client
                .post("https://generativelanguage.googleapis.com/v1beta/models/m:generateContent")
                .header("x-goog-api-key", "secret")
                .json(&serde_json::json!({"contents": []}))
                .send()
                .await
        })
        .await
        .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let headers = sent_headers.lock().unwrap().clone().unwrap();
        assert!(headers
            .keys()
            .all(|name| !name.as_str().contains("correlation")));
        assert_eq!(headers["x-goog-api-key"], "secret");

        let request = events.recv().await.unwrap();
        assert_eq!(request.correlation_id, "analysis-42");
        assert_eq!(request.event_type, EventType::LlmApiCall);
        assert_eq!(request.operation, "POST /v1beta/models/m:generateContent");
        assert!(!request.data.to_string().contains("secret"));

        let response = events.recv().await.unwrap();
        assert_eq!(response.correlation_id, "analysis-42");
        assert_eq!(response.operation, "response_200");
    }

    #[tokio::test]
    async fn test_calls_outside_an_analysis_get_their_own_id() {
        let (logger, mut events) = RecordingLogger::channel(8);
        let (client, _) = recording_client(logger);

        client.get("https://api.openai.com/v1/models").send().await.unwrap();
        client.get("https://api.openai.com/v1/models").send().await.unwrap();

        let first = events.recv().await.unwrap();
        let first_response = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert!(!first.correlation_id.is_empty());
        assert_eq!(first.correlation_id, first_response.correlation_id);
        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[test]
    fn test_request_data_is_sanitized() {
        let client = reqwest::Client::new();
        let request = client
            .post("https://generativelanguage.googleapis.com/v1beta/models/m:generateContent")
            .header("x-goog-api-key", "secret-key")
            .json(&serde_json::json!({"contents": [], "api_key": "inline"}))
            .build()
            .unwrap();

        let data = extract_request_data(&request);
        assert_eq!(data.method, "POST");
        assert_eq!(data.headers["x-goog-api-key"], "[REDACTED]");
        assert!(!data.body.contains("inline"));
        assert!(data.body.contains("contents"));
    }

    #[test]
    fn test_extract_path() {
        assert_eq!(
            extract_path("https://api.openai.com/v1/chat/completions?x=1"),
            "/v1/chat/completions"
        );
        assert_eq!(extract_path("not a url"), "not a url");
    }
}
