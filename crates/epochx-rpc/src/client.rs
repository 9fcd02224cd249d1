use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use epochx_core::types::U256;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

/// Failures of a single JSON-RPC call. Callers fold these into the
/// `ProverError` variant of whichever collaborator they were talking to.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Minimal JSON-RPC 2.0 client over HTTP POST.
///
/// Uses raw reqwest with serde_json rather than a generated jsonrpsee client;
/// the remote collaborators are not jsonrpsee services.
pub struct JsonRpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Self {
        Self::with_timeout(url, Duration::from_secs(10))
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url: url.to_string(), client, next_id: AtomicU64::new(1) }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call a JSON-RPC method and return the raw `result` field.
    pub async fn call_value(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });
        trace!(url = %self.url, method, id, "json-rpc call");

        let http = |e: reqwest::Error| ClientError::Http {
            url: self.url.clone(),
            reason: e.to_string(),
        };
        let resp = self.client.post(&self.url).json(&body).send().await.map_err(http)?;
        let json: Value = resp.json().await.map_err(http)?;
        parse_response(json)
    }

    /// Call a JSON-RPC method and deserialize its `result`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let result = self.call_value(method, params).await?;
        serde_json::from_value(result).map_err(|e| ClientError::Decode(format!("{method}: {e}")))
    }
}

/// Split a JSON-RPC response envelope into its result or its error object.
pub fn parse_response(json: Value) -> Result<Value, ClientError> {
    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        return Err(ClientError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match json.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(ClientError::Decode("response carries neither result nor error".into())),
    }
}

/// Read a 256-bit integer sent as a JSON number, a decimal string or a
/// 0x-prefixed hex string.
pub fn u256_from_json(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => s.trim().parse::<U256>().ok(),
        _ => None,
    }
}

/// Render a 256-bit integer as a JSON number when it fits in a u64, else as
/// a decimal string.
pub fn u256_to_json(value: U256) -> Value {
    match u64::try_from(value) {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(value.to_string()),
    }
}
