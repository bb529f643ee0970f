//! Shared JSON-over-HTTP request client.
//!
//! Both API adapters (Telegram, Webling) send through [`RequestClient`]. It does
//! one attempt per call; retry policy lives in [`crate::retry`] because the
//! flood-control signal differs per upstream.

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
pub use reqwest::Method;
use serde_json::Value;

use crate::{errors::Error, Result};

#[derive(Clone, Copy, Debug)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
        }
    }
}

/// A response that arrived and whose body (if any) is valid JSON.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// `Retry-After` header in seconds, when present and numeric.
    pub retry_after_header: Option<u64>,
    pub body: Option<Value>,
}

/// Result of a single HTTP attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum HttpResult {
    Response(HttpResponse),
    /// Body present but not JSON. Permanent whatever the status.
    Malformed { status: u16, raw: String },
    /// No response at all (connect error, timeout, reset).
    Transport(String),
}

/// Classified outcome of one outbound call; drives the retry policy.
#[derive(Clone, Debug, PartialEq)]
pub enum ApiOutcome {
    Success(Value),
    RateLimited { retry_after: Option<u64> },
    TransientFailure { status: Option<u16> },
    PermanentFailure { status: u16, body: String },
}

impl HttpResult {
    /// Classify this attempt. `retry_after` extracts the service-specific
    /// flood-control wait from a 429 response.
    pub fn into_outcome(self, retry_after: impl FnOnce(&HttpResponse) -> Option<u64>) -> ApiOutcome {
        match self {
            HttpResult::Transport(_) => ApiOutcome::TransientFailure { status: None },
            HttpResult::Malformed { status, raw } => ApiOutcome::PermanentFailure { status, body: raw },
            HttpResult::Response(resp) => match resp.status {
                200..=299 => ApiOutcome::Success(resp.body.unwrap_or(Value::Null)),
                429 => ApiOutcome::RateLimited {
                    retry_after: retry_after(&resp),
                },
                s if s >= 500 => ApiOutcome::TransientFailure { status: Some(s) },
                s => ApiOutcome::PermanentFailure {
                    status: s,
                    body: resp.body.map(|b| b.to_string()).unwrap_or_default(),
                },
            },
        }
    }
}

/// Thin reqwest wrapper with fixed timeouts and certificate verification on.
#[derive(Clone, Debug)]
pub struct RequestClient {
    http: reqwest::Client,
}

impl RequestClient {
    pub fn new(cfg: HttpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(cfg.connect_timeout)
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { http })
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> HttpResult {
        let mut req = self.http.request(method.clone(), url);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%method, url = %redact(url), error = %e, "http transport failure");
                return HttpResult::Transport(e.to_string());
            }
        };

        let status = resp.status().as_u16();
        let retry_after_header = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(%method, url = %redact(url), status, error = %e, "http body read failure");
                return HttpResult::Transport(e.to_string());
            }
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return HttpResult::Response(HttpResponse {
                status,
                retry_after_header,
                body: None,
            });
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(v) => HttpResult::Response(HttpResponse {
                status,
                retry_after_header,
                body: Some(v),
            }),
            Err(_) => HttpResult::Malformed {
                status,
                raw: String::from_utf8_lossy(&bytes).chars().take(500).collect(),
            },
        }
    }
}

/// Strip a Telegram bot token (`/bot<id>:<secret>/`) from URLs before logging.
/// Path segments that merely start with `bot` are left alone.
pub fn redact(url: &str) -> String {
    let mut from = 0;
    while let Some(found) = url[from..].find("/bot") {
        let start = from + found;
        let rest = &url[start + 4..];
        let end = rest.find('/').unwrap_or(rest.len());
        if rest[..end].contains(':') {
            return format!("{}/bot***{}", &url[..start], &rest[end..]);
        }
        from = start + 4;
    }
    url.to_string()
}
