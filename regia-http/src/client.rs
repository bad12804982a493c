use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use regia_core::{HttpSettings, RegiaError, RegiaResult};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Rate-limited HTTP client shared by all regulatory sources. Retries are the
/// caller's decision; this layer only enforces the user agent, the per-call
/// deadline and the request budget.
pub struct HttpClient {
    client: reqwest::Client,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> RegiaResult<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs.max(1));
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| RegiaError::ConfigurationError {
                parameter: "http_client".to_string(),
                reason: e.to_string(),
            })?;

        let per_minute = NonZeroU32::new(settings.requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::new(60).unwrap());
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            client,
            limiter,
            timeout,
        })
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> RegiaResult<HttpResponse> {
        self.limiter.until_ready().await;
        debug!(url = url, "http get");

        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_request_error("get", url, e))?;

        self.read_response("get", response).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: &str,
        headers: &HashMap<String, String>,
    ) -> RegiaResult<HttpResponse> {
        self.limiter.until_ready().await;
        debug!(url = url, "http post");

        let mut request = self.client.post(url).body(body.to_string());
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_request_error("post", url, e))?;

        self.read_response("post", response).await
    }

    async fn read_response(
        &self,
        operation: &str,
        response: reqwest::Response,
    ) -> RegiaResult<HttpResponse> {
        let status_code = response.status().as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), value.to_string());
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegiaError::ProtocolError {
                operation: operation.to_string(),
                reason: format!("failed to read response body: {}", e),
            })?;

        Ok(HttpResponse {
            status_code,
            body,
            headers,
        })
    }

    fn map_request_error(&self, operation: &str, url: &str, err: reqwest::Error) -> RegiaError {
        if err.is_timeout() {
            RegiaError::TimeoutError {
                operation: format!("{} {}", operation, url),
                duration_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_connect() || err.is_request() {
            RegiaError::NetworkError {
                operation: format!("{} {}", operation, url),
                reason: err.to_string(),
            }
        } else {
            RegiaError::ProtocolError {
                operation: format!("{} {}", operation, url),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regia_core::HttpSettings;

    #[test]
    fn test_client_builds_with_defaults() {
        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_timeout_clamped() {
        let settings = HttpSettings {
            timeout_secs: 0,
            ..HttpSettings::default()
        };
        let client = HttpClient::new(&settings).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_response_success_range() {
        let mut response = HttpResponse {
            status_code: 200,
            body: String::new(),
            headers: HashMap::new(),
        };
        assert!(response.is_success());
        response.status_code = 299;
        assert!(response.is_success());
        response.status_code = 301;
        assert!(!response.is_success());
        response.status_code = 404;
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst() {
        let client = HttpClient::new(&HttpSettings::default()).unwrap();
        // The default quota allows an immediate burst; until_ready must not hang.
        client.limiter.until_ready().await;
        client.limiter.until_ready().await;
    }

    #[tokio::test]
    async fn test_get_unreachable_host_is_network_error() {
        let settings = HttpSettings {
            timeout_secs: 2,
            ..HttpSettings::default()
        };
        let client = HttpClient::new(&settings).unwrap();
        let result = client
            .get("http://127.0.0.1:1/unreachable", &HashMap::new())
            .await;
        assert!(matches!(
            result,
            Err(RegiaError::NetworkError { .. }) | Err(RegiaError::TimeoutError { .. })
        ));
    }
}
