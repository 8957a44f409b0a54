//! Retrying, rate-limit-aware HTTP client with a caching hook (spec §4.1).

pub mod backoff;

use crate::cache::CacheManager;
use crate::error::PipelineError;
use crate::model::Node;
use backoff::BackoffConfig;
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// Process-wide HTTP client configuration.
///
/// The base URL is resolved once per process: `ENSEMBL_BASE_URL` overrides
/// whatever the caller configured (spec §5, §6).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub backoff: BackoffConfig,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = std::env::var("ENSEMBL_BASE_URL").unwrap_or_else(|_| base_url.into());
        Self {
            base_url,
            timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Retrying HTTP client. One instance is shared across the whole pipeline run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: HttpClientConfig,
}

/// Statuses that trigger a retry, per spec §4.1.
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503 | 504
    )
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// `fetch(endpoint, query, cacheEnabled, method, body?) -> data` (spec §4.1).
    pub async fn fetch(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        cache_enabled: bool,
        method: Method,
        body: Option<&Node>,
        cache: Option<&CacheManager>,
    ) -> Result<Node, PipelineError> {
        let cache_key = cache_key_for(endpoint, query, body);

        if cache_enabled {
            if let Some(cache) = cache {
                if let Some(hit) = cache.get(&cache_key).await {
                    tracing::trace!(endpoint, "cache hit, skipping HTTP request");
                    return Ok(hit);
                }
            }
        }

        let data = self.fetch_uncached(endpoint, query, method, body).await?;

        if cache_enabled {
            if let Some(cache) = cache {
                cache.set(&cache_key, data.clone(), None).await;
            }
        }

        Ok(data)
    }

    async fn fetch_uncached(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
        method: Method,
        body: Option<&Node>,
    ) -> Result<Node, PipelineError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        let max_attempts = self.config.backoff.max_retries + 1;
        let mut last_error: Option<PipelineError> = None;

        for attempt in 1..=max_attempts {
            tracing::debug!(method = %method, url = %url, attempt, "HTTP request attempt");

            let mut request = self.client.request(method.clone(), &url).query(query);
            if let Some(body) = body {
                request = request.json(&serde_json::Value::from(body.clone()));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        let value: serde_json::Value = serde_json::from_str(&text)
                            .map_err(|e| PipelineError::Permanent {
                                status: status.as_u16(),
                                message: format!("invalid JSON response: {e}"),
                            })?;
                        return Ok(Node::from(value));
                    }

                    if is_retryable_status(status) {
                        let retry_after = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| backoff::parse_retry_after(v, chrono::Utc::now()));

                        let body_snippet = response.text().await.unwrap_or_default();
                        let truncated: String = body_snippet.chars().take(500).collect();
                        tracing::warn!(
                            status = status.as_u16(),
                            attempt,
                            body = %truncated,
                            "retryable HTTP status"
                        );

                        last_error = Some(PipelineError::Transient {
                            attempts: attempt,
                            message: format!("HTTP {status}: {truncated}"),
                        });

                        if attempt < max_attempts {
                            let delay = self
                                .config
                                .backoff
                                .delay_with_retry_after(attempt, retry_after);
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                    } else {
                        let body_snippet = response.text().await.unwrap_or_default();
                        let truncated: String = body_snippet.chars().take(500).collect();
                        tracing::warn!(status = status.as_u16(), body = %truncated, "permanent HTTP error");
                        return Err(PipelineError::Permanent {
                            status: status.as_u16(),
                            message: truncated,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "network error");
                    last_error = Some(PipelineError::Transient {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                    if attempt < max_attempts {
                        let delay = self.config.backoff.delay_for_attempt(attempt);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::Transient {
            attempts: max_attempts,
            message: "exhausted retries with no recorded error".to_string(),
        }))
    }
}

/// Build a stable cache key from the request shape.
fn cache_key_for(endpoint: &str, query: &[(&str, &str)], body: Option<&Node>) -> String {
    let mut key = endpoint.to_string();
    for (k, v) in query {
        key.push(':');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    if let Some(body) = body {
        key.push(':');
        key.push_str(&body.to_string());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_succeeds_on_first_try() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new(HttpClientConfig::new(server.uri())).unwrap();
        let data = client
            .fetch("lookup", &[], false, Method::GET, None, None)
            .await
            .unwrap();
        assert_eq!(data.get("ok"), Node::Bool(true));
    }

    #[tokio::test]
    async fn fetch_retries_on_500_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let mut config = HttpClientConfig::new(server.uri());
        config.backoff.base_delay = Duration::from_millis(1);
        let client = HttpClient::new(config).unwrap();
        let data = client
            .fetch("flaky", &[], false, Method::GET, None, None)
            .await
            .unwrap();
        assert_eq!(data.get("ok"), Node::Bool(true));
    }

    #[tokio::test]
    async fn fetch_surfaces_permanent_error_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(HttpClientConfig::new(server.uri())).unwrap();
        let err = client
            .fetch("bad", &[], false, Method::GET, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Permanent { status: 404, .. }));
    }

    #[tokio::test]
    async fn fetch_exhausts_retries_and_surfaces_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = HttpClientConfig::new(server.uri());
        config.backoff.base_delay = Duration::from_millis(1);
        config.backoff.max_retries = 2;
        let client = HttpClient::new(config).unwrap();
        let err = client
            .fetch("down", &[], false, Method::GET, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transient { attempts: 3, .. }));
    }
}
