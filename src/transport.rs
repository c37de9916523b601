//! JSON-RPC transports behind the provider pool.

use crate::error::{ConfigError, RpcError};
use async_trait::async_trait;
use ethers::providers::JsonRpcError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// Maximum number of body bytes kept in an [`RpcError::Http`] payload.
const MAX_ERROR_BODY: usize = 512;

/// One JSON-RPC request/response exchange with a single endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync + fmt::Debug {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 over HTTP(S).
pub struct HttpTransport {
    url: Url,
    label: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, ConfigError> {
        let label = redact_url(url);
        let url = Url::parse(url.trim()).map_err(|e| ConfigError::InvalidEndpoint {
            label: label.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                label,
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::InvalidEndpoint {
                label: label.clone(),
                reason: e.without_url().to_string(),
            })?;

        Ok(Self {
            url,
            label,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The full URL may embed an API key.
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.label)
            .finish()
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            return Err(RpcError::Http {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        let envelope: ResponseEnvelope =
            serde_json::from_str(&text).map_err(|e| RpcError::InvalidResponse {
                method: method.to_string(),
                reason: format!("{} (body: {})", e, truncate(&text, MAX_ERROR_BODY)),
            })?;

        if let Some(error) = envelope.error {
            return Err(RpcError::JsonRpc(error));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        // reqwest does not expose the configured value; the pool reports its own.
        return RpcError::Transport(format!("request timed out: {}", e.without_url()));
    }
    if let Some(status) = e.status() {
        return RpcError::Http {
            status: status.as_u16(),
            body: String::new(),
        };
    }
    RpcError::Transport(e.without_url().to_string())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Loggable form of an endpoint URL: scheme, host and port only. Credentials,
/// paths and query strings (where providers put API keys) are dropped.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("unknown-host");
            let mut label = match url.port() {
                Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
                None => format!("{}://{}", url.scheme(), host),
            };
            let has_secret_parts = !url.username().is_empty()
                || url.password().is_some()
                || url.query().is_some()
                || (url.path() != "/" && !url.path().is_empty());
            if has_secret_parts {
                label.push_str("/***");
            }
            label
        }
        Err(_) => "<unparseable-url>".to_string(),
    }
}
