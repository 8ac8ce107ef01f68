//! Model provider abstractions.
//!
//! Defines the [`ModelProvider`] trait, the wire-level [`ChatMessage`]
//! type, concrete backends ([`OllamaProvider`], [`OpenAICompatProvider`])
//! and the tool-aware [`ModelBinding`] the control loop talks to.

pub mod binding;
pub mod ollama;
pub mod openai_compat;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{ModelConfig, ProviderKind};

pub use binding::ModelBinding;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAICompatProvider;

// ---------------------------------------------------------------------------
// ChatMessage – shared message representation
// ---------------------------------------------------------------------------

/// A single chat message with a role and content.
///
/// Optionally carries tool-calling metadata so that `tool` role messages
/// and assistant `tool_calls` responses are serialised correctly for the
/// API.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// For assistant messages that invoke tools: OpenAI-format
    /// `tool_calls` entries (`{id, type, function: {name, arguments}}`).
    pub tool_calls: Option<Vec<serde_json::Value>>,
    /// For `role: "tool"` messages: the id of the tool call
    /// this result corresponds to.
    pub tool_call_id: Option<String>,
    /// For `role: "tool"` messages: the tool that produced the result.
    pub name: Option<String>,
}

impl ChatMessage {
    /// Convenience constructor for a plain message (no tool metadata).
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// Serialise a slice of [`ChatMessage`]s into the OpenAI-compatible
/// JSON array format, including `tool_calls` and `tool_call_id` when
/// present.
pub fn serialize_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = serde_json::json!({ "role": m.role });
            if let Some(ref tcs) = m.tool_calls {
                msg["tool_calls"] = serde_json::json!(tcs);
                // OpenAI expects content to be null (or absent) on
                // assistant messages that carry tool_calls.
                if m.content.is_empty() {
                    msg["content"] = serde_json::Value::Null;
                } else {
                    msg["content"] = serde_json::json!(m.content);
                }
            } else {
                msg["content"] = serde_json::json!(m.content);
            }
            if let Some(ref tcid) = m.tool_call_id {
                msg["tool_call_id"] = serde_json::json!(tcid);
            }
            msg
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ModelProvider trait
// ---------------------------------------------------------------------------

/// Trait implemented by every LLM backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a sequence of chat messages and return the assistant's reply.
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error>;

    /// Send chat messages together with tool definitions
    /// (`{"type": "function", "function": {...}}` entries).
    ///
    /// The default implementation ignores the tools and wraps the
    /// plain [`send_chat`](ModelProvider::send_chat) reply.
    async fn send_chat_with_functions(
        &self,
        messages: &[ChatMessage],
        _functions: &[serde_json::Value],
    ) -> Result<(ProviderResponse, Option<TokenUsage>), anyhow::Error> {
        let reply = self.send_chat(messages).await?;
        Ok((ProviderResponse::Final(reply), None))
    }

    /// Short backend label used in logs and the shell banner.
    fn name(&self) -> &str;

    /// Downcast helper so callers can check the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Extract token usage statistics from an OpenAI-style response JSON.
pub fn parse_token_usage(json: &serde_json::Value) -> Option<TokenUsage> {
    let usage = json.get("usage")?;
    Some(TokenUsage {
        prompt_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        total_tokens: usage["total_tokens"].as_u64().unwrap_or(0),
    })
}

/// Parse `tool_calls` from an OpenAI-style chat completion response.
///
/// Returns `None` when the response carries no tool calls.  Falls back
/// to the legacy `function_call` field.
pub fn parse_tool_calls(json: &serde_json::Value) -> Option<ProviderResponse> {
    let message = json.get("choices")?.get(0)?.get("message")?;
    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    if let Some(tool_calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
        let calls: Vec<FunctionCallItem> = tool_calls
            .iter()
            .filter_map(|tc| {
                let func = tc.get("function")?;
                let name = func.get("name")?.as_str()?.to_string();
                let arguments = match func.get("arguments") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => "{}".to_string(),
                    // Some servers send the object itself.
                    Some(other) => other.to_string(),
                };
                let id = tc
                    .get("id")
                    .and_then(|i| i.as_str())
                    .unwrap_or("")
                    .to_string();
                Some(FunctionCallItem { id, name, arguments })
            })
            .collect();

        if !calls.is_empty() {
            return Some(ProviderResponse::ToolCalls { content, calls });
        }
    }

    // Legacy `function_call` field.
    if let Some(fc) = message.get("function_call").and_then(|v| v.as_object()) {
        let name = fc
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = fc
            .get("arguments")
            .and_then(|v| v.as_str())
            .unwrap_or("{}")
            .to_string();
        return Some(ProviderResponse::ToolCalls {
            content,
            calls: vec![FunctionCallItem {
                id: String::new(),
                name,
                arguments,
            }],
        });
    }

    None
}

// ---------------------------------------------------------------------------
// ProviderResponse – function-calling aware response
// ---------------------------------------------------------------------------

/// Token usage statistics returned by the API.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single function call within a response.
#[derive(Debug, Clone)]
pub struct FunctionCallItem {
    /// Tool call id from the API; empty when the backend supplies none.
    pub id: String,
    pub name: String,
    /// Raw JSON-encoded argument object.
    pub arguments: String,
}

/// Response from a model that may be a final text reply or tool calls.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    /// Plain text reply from the model.
    Final(String),
    /// The model wants to invoke one or more tools, in this order.
    ToolCalls {
        /// Text emitted alongside the calls (often empty).
        content: String,
        calls: Vec<FunctionCallItem>,
    },
}

// ---------------------------------------------------------------------------
// Provider factory
// ---------------------------------------------------------------------------

/// Build the configured backend.
///
/// Returns `Ok(None)` for `provider: none`.  Construction does not contact
/// the backend; reachability problems surface on the first request.
pub fn build_provider(cfg: &ModelConfig) -> anyhow::Result<Option<Arc<dyn ModelProvider>>> {
    let timeout = std::time::Duration::from_secs(cfg.timeout_secs);
    match cfg.provider {
        ProviderKind::None => Ok(None),
        ProviderKind::Ollama => {
            let base = cfg.endpoint.clone().unwrap_or_else(|| cfg.base_url());
            let provider = OllamaProvider::new(base, cfg.model.clone(), cfg.temperature, timeout)?;
            Ok(Some(Arc::new(provider)))
        }
        ProviderKind::OpenaiCompat => {
            let endpoint = cfg.endpoint.clone().unwrap_or_default();
            if endpoint.is_empty() {
                anyhow::bail!("openai-compat provider requires an endpoint");
            }
            let key = resolve_config_key(cfg.api_key.as_deref(), "openai-compat");
            if key.is_empty() {
                warn!("openai-compat provider has no API key; sending unauthenticated requests");
            }
            let provider = OpenAICompatProvider::new(
                endpoint,
                key,
                cfg.model.clone(),
                cfg.temperature,
                timeout,
            )?;
            Ok(Some(Arc::new(provider)))
        }
    }
}

/// Resolve an API key: config value → env var → empty string.
///
/// If the config value starts with `$`, it's treated as an env-var reference.
fn resolve_config_key(config_key: Option<&str>, provider_id: &str) -> String {
    if let Some(k) = config_key {
        if let Some(var) = k.strip_prefix('$') {
            return std::env::var(var).unwrap_or_default();
        }
        if !k.is_empty() {
            return k.to_string();
        }
    }
    // Fallback: try PROVIDER_API_KEY env var.
    let env_name = format!("{}_API_KEY", provider_id.to_uppercase().replace('-', "_"));
    std::env::var(env_name).unwrap_or_default()
}
