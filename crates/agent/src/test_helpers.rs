//! Shared test helpers for the agent crate.

use async_trait::async_trait;
use noteloom_core::CancellationToken;
use noteloom_core::error::{ProviderError, ToolError};
use noteloom_core::provider::{ModelClient, ModelRequest, ModelResponse, Usage};
use noteloom_core::tool::{Tool, ToolCall, ToolResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A model client that returns scripted responses in order and records
/// every request it receives.
pub(crate) struct ScriptedClient {
    responses: Mutex<Vec<Result<ModelResponse, ProviderError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    call_count: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<ModelResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Wait this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn answers(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(answer(t))).collect())
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ModelRequest,
        _cancel: &CancellationToken,
    ) -> Result<ModelResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if idx < responses.len() {
            std::mem::replace(&mut responses[idx], Err(ProviderError::Cancelled))
        } else {
            panic!("ScriptedClient: no more responses (call #{idx})");
        }
    }
}

/// A final answer with provider usage.
pub(crate) fn answer(text: &str) -> ModelResponse {
    ModelResponse {
        content: text.to_string(),
        tool_calls: vec![],
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted-model".into(),
    }
}

/// A response asking for the given `(name, arguments)` tool calls.
pub(crate) fn tool_request(calls: &[(&str, serde_json::Value)]) -> ModelResponse {
    ModelResponse {
        content: String::new(),
        tool_calls: calls
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{i}"),
                name: (*name).to_string(),
                arguments: arguments.clone(),
            })
            .collect(),
        usage: None,
        model: "scripted-model".into(),
    }
}

/// A tool whose handler always fails.
pub(crate) struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "flaky"
    }
    fn description(&self) -> &str {
        "Always fails"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "flaky".into(),
            reason: "disk on fire".into(),
        })
    }
}

/// A tool whose handler panics.
pub(crate) struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "explode"
    }
    fn description(&self) -> &str {
        "Panics"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        panic!("tool blew up");
    }
}
