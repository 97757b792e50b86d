//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Only used when
//! the model client reports no usage counters.

use noteloom_core::provider::{ChatMessage, ModelRequest, ToolDefinition, Usage};

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name, delimiters,
/// and formatting markers in the API wire format.
pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    let overhead = 4;
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments.to_string()))
        .sum();
    overhead + estimate_tokens(&message.content) + calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for a tool definition (serialized as JSON).
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    let json = serde_json::to_string(tool).unwrap_or_default();
    estimate_tokens(&json)
}

/// Estimated usage for one round trip: everything sent, plus the answer.
pub fn estimate_usage(request: &ModelRequest, completion: &str) -> Usage {
    let prompt = estimate_tokens(&request.system_prompt)
        + estimate_messages_tokens(&request.messages)
        + request.tools.iter().map(estimate_tool_tokens).sum::<usize>();
    let completion = estimate_tokens(completion);
    let prompt = u32::try_from(prompt).unwrap_or(u32::MAX);
    let completion = u32::try_from(completion).unwrap_or(u32::MAX);
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt.saturating_add(completion),
    }
}
