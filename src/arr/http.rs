//! JSON-over-HTTP request wrapper for the Whisparr API.
//!
//! One call is one logical request: idempotent methods are retried on
//! 500/502/503/504 with exponential backoff, failures become
//! [`BridgeError::RemoteService`], and typed decoding never fails the call.

use crate::error::{BridgeError, Result};
use crate::logging::safe_json_preview;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Timeout applied to a call unless the caller asks for another
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// How often and how patiently a failing call is repeated
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// A response body, typed when it matched the expected shape
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Typed(T),
    Raw(Value),
}

impl<T> Decoded<T> {
    pub fn typed(self) -> Option<T> {
        match self {
            Decoded::Typed(value) => Some(value),
            Decoded::Raw(_) => None,
        }
    }
}

/// Decode `value` into `T`, falling back to the raw JSON on mismatch.
pub fn decode<T: DeserializeOwned>(value: Value) -> Decoded<T> {
    match T::deserialize(&value) {
        Ok(typed) => Decoded::Typed(typed),
        Err(e) => {
            tracing::warn!("Failed to parse response into {}: {}", std::any::type_name::<T>(), e);
            Decoded::Raw(value)
        }
    }
}

/// Whether a method may be repeated after a 5xx without side effects
fn is_retryable_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// A single outgoing call
#[derive(Debug, Clone)]
pub struct JsonRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl<'a> JsonRequest<'a> {
    pub fn get(url: &'a str) -> Self {
        Self {
            method: Method::GET,
            url,
            query: Vec::new(),
            body: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn post(url: &'a str, body: Value) -> Self {
        Self {
            method: Method::POST,
            url,
            query: Vec::new(),
            body: Some(body),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client bound to one API key
#[derive(Clone)]
pub struct HttpJson {
    client: Client,
    api_key: String,
    retry: RetryPolicy,
    max_log_body: usize,
}

impl HttpJson {
    pub fn new(api_key: impl Into<String>, max_log_body: usize) -> Self {
        let client = Client::builder().build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client: {}", e);
            Client::new()
        });

        Self {
            client,
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            max_log_body,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Issue the call and return the parsed JSON body.
    ///
    /// Non-JSON bodies come back as a JSON string, empty bodies as `null`.
    pub async fn send(&self, request: &JsonRequest<'_>) -> Result<Value> {
        let method = request.method.as_str();
        tracing::debug!(
            "{} {} params={:?} body={}",
            method,
            request.url,
            request.query,
            request
                .body
                .as_ref()
                .map(|b| safe_json_preview(b, self.max_log_body))
                .unwrap_or_else(|| "null".to_string())
        );

        let retryable = is_retryable_method(&request.method);
        let mut attempt = 1;

        loop {
            let mut builder = self
                .client
                .request(request.method.clone(), request.url)
                .header("X-Api-Key", &self.api_key)
                .header(header::ACCEPT, "application/json")
                .timeout(request.timeout);

            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(ref body) = request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                tracing::error!("HTTP request failed for {} {}: {}", method, request.url, e);
                BridgeError::transport(method, request.url, e)
            })?;

            let status = response.status().as_u16();
            if retryable && RETRY_STATUSES.contains(&status) && attempt < self.retry.max_attempts {
                let delay = self.retry.delay(attempt);
                tracing::warn!(
                    status,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying {} {}",
                    method,
                    request.url
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| BridgeError::transport(method, request.url, e))?;
            let parsed = parse_body(&text);

            if status >= 400 {
                let body = safe_json_preview(&parsed, self.max_log_body);
                tracing::error!("HTTP {} error for {} {}: {}", status, method, request.url, body);
                return Err(BridgeError::http_status(method, request.url, status, body));
            }

            return Ok(parsed);
        }
    }

    /// Issue the call and decode the body into `T` where possible.
    pub async fn send_decoded<T: DeserializeOwned>(
        &self,
        request: &JsonRequest<'_>,
    ) -> Result<Decoded<T>> {
        let value = self.send(request).await?;
        Ok(decode(value))
    }
}
