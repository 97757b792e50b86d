//! The model/tool round-trip loop.
//!
//! ```text
//! AwaitingModel ──answer──▶ Done
//!      │  ▲
//! calls│  │results
//!      ▼  │
//! ExecutingTools
//! ```
//!
//! Any state can move to `Aborted` on cancellation or when the iteration cap
//! is hit. A failing tool never ends the loop; its failure is handed back to
//! the model as a tool result.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use noteloom_core::CancellationToken;
use noteloom_core::error::{Error, ProviderError, Result};
use noteloom_core::event::{DomainEvent, EventBus};
use noteloom_core::provider::{ChatMessage, ModelClient, ModelRequest, Usage};
use noteloom_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, info, warn};

use crate::context::token;

/// Default cap on model calls per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 4;

pub const ITERATION_LIMIT_MESSAGE: &str = "I've reached the iteration limit for tool calls in this turn. \
Please review the results so far or ask me to continue.";

const INVALID_TOOL_CALL: &str = "invalid tool call";

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
    Aborted,
}

/// How the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model gave a final answer
    Answer,
    /// The iteration cap was hit
    IterationLimit,
}

/// Everything a finished loop produced.
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub content: String,
    pub outcome: LoopOutcome,
    /// Model calls made
    pub iterations: u32,
    /// Every tool result, in execution order
    pub tool_results: Vec<ToolResult>,
    pub usage: Usage,
    /// True when at least one round trip had no provider counters
    pub usage_estimated: bool,
    pub model: String,
}

/// Drives the model until it answers, the cap is hit, or the turn is
/// cancelled.
pub struct ToolLoopExecutor {
    client: Arc<dyn ModelClient>,
    tools: Arc<ToolRegistry>,
    max_iterations: u32,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolLoopExecutor {
    pub fn new(client: Arc<dyn ModelClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            event_bus: None,
        }
    }

    /// Set the cap on model calls. Zero is treated as one.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Publish a `ToolExecuted` event for every call.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run the loop for `request`.
    ///
    /// The token is checked before each model call and each tool batch. Tools
    /// already running when it fires are allowed to finish.
    pub async fn run(
        &self,
        mut request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<LoopResult> {
        let mut state = LoopState::AwaitingModel;
        let mut iterations = 0u32;
        let mut pending: Vec<ToolCall> = Vec::new();
        let mut tool_results = Vec::new();
        let mut usage = Usage::default();
        let mut usage_estimated = false;
        let mut model = request.model.clone();
        let mut content = String::new();
        let mut outcome = LoopOutcome::Answer;

        loop {
            debug!(?state, iterations, "Tool loop step");
            match state {
                LoopState::AwaitingModel => {
                    if cancel.is_cancelled() {
                        info!(iterations, "Turn cancelled before model call");
                        return Err(Error::Cancelled);
                    }
                    iterations += 1;

                    let response = self
                        .client
                        .complete(request.clone(), cancel)
                        .await
                        .map_err(|e| match e {
                            ProviderError::Cancelled => Error::Cancelled,
                            other => Error::Provider(other),
                        })?;

                    match response.usage.filter(|u| !u.is_empty()) {
                        Some(reported) => usage.accumulate(&reported),
                        None => {
                            usage_estimated = true;
                            usage.accumulate(&token::estimate_usage(&request, &response.content));
                        }
                    }
                    if !response.model.is_empty() {
                        model = response.model.clone();
                    }

                    if response.is_final() {
                        content = response.content;
                        state = LoopState::Done;
                    } else if iterations >= self.max_iterations {
                        warn!(
                            iterations,
                            requested = response.tool_calls.len(),
                            "Max tool iterations reached, not executing further calls"
                        );
                        content = ITERATION_LIMIT_MESSAGE.to_string();
                        outcome = LoopOutcome::IterationLimit;
                        state = LoopState::Aborted;
                    } else {
                        debug!(tool_count = response.tool_calls.len(), "Model requested tools");
                        let mut assistant = ChatMessage::assistant(response.content);
                        assistant.tool_calls = response.tool_calls.clone();
                        request.messages.push(assistant);
                        pending = response.tool_calls;
                        state = LoopState::ExecutingTools;
                    }
                }
                LoopState::ExecutingTools => {
                    if cancel.is_cancelled() {
                        info!(iterations, "Turn cancelled before tool batch");
                        return Err(Error::Cancelled);
                    }
                    let calls = std::mem::take(&mut pending);
                    let results = self.execute_batch(&calls).await;
                    for result in &results {
                        request
                            .messages
                            .push(ChatMessage::tool_result(&result.call_id, &result.output));
                    }
                    tool_results.extend(results);
                    state = LoopState::AwaitingModel;
                }
                LoopState::Done | LoopState::Aborted => break,
            }
        }

        info!(
            iterations,
            ?outcome,
            tools_run = tool_results.len(),
            tokens = usage.total_tokens,
            "Tool loop finished"
        );

        Ok(LoopResult {
            content,
            outcome,
            iterations,
            tool_results,
            usage,
            usage_estimated,
            model,
        })
    }

    /// Run one batch concurrently. Results come back in request order.
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| async move {
            let start = Instant::now();
            let result = Self::execute_one_tool_call(call, &self.tools).await;
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            if let Some(bus) = &self.event_bus {
                bus.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: result.success,
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            result
        }))
        .await
    }

    /// Execute a single call. Every failure, including a panic inside the
    /// tool, comes back as a failed result.
    pub async fn execute_one_tool_call(call: &ToolCall, registry: &ToolRegistry) -> ToolResult {
        if call.name.trim().is_empty() {
            warn!(call_id = %call.id, "Tool call without a name");
            return ToolResult::failure(&call.id, "", INVALID_TOOL_CALL);
        }

        if registry.get(&call.name).is_none() {
            warn!(tool = %call.name, "Model asked for an unknown tool");
            return ToolResult::failure(
                &call.id,
                &call.name,
                format!("tool not found, available: {}", registry.names().join(", ")),
            );
        }

        match AssertUnwindSafe(registry.execute(call)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(&call.id, &call.name, format!("Error: {e}"))
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(tool = %call.name, reason = %reason, "Tool panicked");
                ToolResult::failure(&call.id, &call.name, format!("Error: tool panicked: {reason}"))
            }
        }
    }
}
