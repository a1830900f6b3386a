use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::runtime::Handle;

/// Returned in place of the reply text when the backend answers 200 but the
/// body carries no `text` field.
pub const MISSING_TEXT_SENTINEL: &str = "No response";

/// The `Display` forms are the strings handed back into the sandbox; they
/// must stay stable because agent code may match on them.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Error: HTTP {0}")]
    Status(u16),
    #[error("Error calling LLM: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, BridgeError>;
}

pub struct HttpBackend {
    client: Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BridgeError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(BridgeError::Status(status));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| BridgeError::Transport(err.to_string()))?;
        Ok(body
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or(MISSING_TEXT_SENTINEL)
            .to_owned())
    }
}

/// Blocking gateway handed to the sandbox. The interpreter runs on a plain
/// OS thread and cannot suspend mid-call, so the round-trip is driven to
/// completion on the runtime handle before control returns to Python code;
/// the sandbox thread is starved for the duration, and nothing else is
/// scheduled on it while a request is in flight. Every failure mode comes
/// back as an ordinary string, never as an error crossing the FFI boundary.
#[derive(Clone)]
pub struct BridgeHandle {
    backend: Arc<dyn Backend>,
    runtime: Handle,
}

impl BridgeHandle {
    pub fn new(backend: Arc<dyn Backend>, runtime: Handle) -> Self {
        Self { backend, runtime }
    }

    pub fn call(&self, prompt: &str) -> String {
        let backend = self.backend.clone();
        let prompt = prompt.to_owned();
        self.runtime
            .block_on(async move { backend.complete(&prompt).await })
            .unwrap_or_else(|err| err.to_string())
    }
}
