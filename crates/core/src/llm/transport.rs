//! Shared HTTP transport for the provider clients.

use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use super::client::{LlmError, LlmUsage};
use crate::metrics;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// HTTP transport with a request timeout and bounded retries for
/// connect/timeout faults.
///
/// Provider errors (non-2xx responses) are never retried here.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl HttpTransport {
    pub fn new(
        provider: &'static str,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// POST a JSON body and decode a JSON response.
    ///
    /// `error_message` pulls a human-readable message out of an error body.
    pub async fn post_json<B, R>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
        error_message: fn(&str) -> Option<String>,
    ) -> Result<R, LlmError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let result = self.post_json_inner(url, headers, body, error_message).await;

        metrics::LLM_REQUEST_DURATION
            .with_label_values(&[self.provider])
            .observe(start.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        metrics::LLM_REQUESTS
            .with_label_values(&[self.provider, outcome])
            .inc();

        result
    }

    async fn post_json_inner<B, R>(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &B,
        error_message: fn(&str) -> Option<String>,
    ) -> Result<R, LlmError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;

        let response = loop {
            let mut builder = self
                .client
                .post(url)
                .header("content-type", "application/json");
            for (name, value) in headers {
                builder = builder.header(*name, value);
            }

            match builder.json(body).send().await {
                Ok(response) => break response,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        provider = self.provider,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Model request failed, retrying"
                    );
                    metrics::LLM_TRANSPORT_RETRIES
                        .with_label_values(&[self.provider])
                        .inc();
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(self.map_error(e)),
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = error_message(&error_text).unwrap_or(error_text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await.map_err(|e| self.map_error(e))?;
        serde_json::from_str(&text).map_err(|e| LlmError::Json(format!("{}: {}", e, text)))
    }

    fn map_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Http(e.to_string())
        }
    }

    pub(crate) fn record_usage(&self, usage: &LlmUsage) {
        metrics::LLM_TOKENS
            .with_label_values(&[self.provider, "input"])
            .inc_by(usage.input_tokens as u64);
        metrics::LLM_TOKENS
            .with_label_values(&[self.provider, "output"])
            .inc_by(usage.output_tokens as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn no_message(_: &str) -> Option<String> {
        None
    }

    #[tokio::test]
    async fn test_connect_failure_is_retried_then_surfaced() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new("test", Duration::from_secs(2), 1).unwrap();
        let result: Result<Value, _> = transport
            .post_json(&format!("http://{}/x", addr), &[], &json!({}), no_message)
            .await;

        let err = result.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {:?}", err);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        use axum::{routing::post, Router};

        let app = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let transport = HttpTransport::new("test", Duration::from_millis(200), 0).unwrap();
        let result: Result<Value, _> = transport
            .post_json(&format!("http://{}/slow", addr), &[], &json!({}), no_message)
            .await;

        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_error_status_is_not_retried() {
        use axum::{http::StatusCode, routing::post, Router};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/busy",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::TOO_MANY_REQUESTS, r#"{"message":"slow down"}"#)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        fn extract(body: &str) -> Option<String> {
            serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
        }

        let transport = HttpTransport::new("test", Duration::from_secs(2), 3).unwrap();
        let result: Result<Value, _> = transport
            .post_json(&format!("http://{}/busy", addr), &[], &json!({}), extract)
            .await;

        match result {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "slow down");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
