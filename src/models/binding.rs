//! Tool-aware model binding.
//!
//! [`ModelBinding`] is selected once at startup: either a live provider
//! with the registry's tool schemas attached, or an unavailable stub.
//! Both variants honour the same contract: [`ModelBinding::complete`]
//! always yields an assistant [`Message`], never an error.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ChatMessage, ModelProvider, ProviderResponse};
use crate::conversation::{Message, ToolCallRequest};
use crate::tools::ToolDescriptor;

/// Prefix of every assistant message produced because the backend
/// could not be used.
pub const UNAVAILABLE_PREFIX: &str = "LLM unavailable";

pub enum ModelBinding {
    Live {
        provider: Arc<dyn ModelProvider>,
        /// Function definitions in `{"type": "function", ...}` form.
        tool_defs: Vec<Value>,
        system_prompt: Option<String>,
    },
    Unavailable {
        reason: String,
    },
}

impl ModelBinding {
    /// Attach tool schemas to a provider.
    pub fn bind(provider: Arc<dyn ModelProvider>, tools: &[ToolDescriptor]) -> Self {
        ModelBinding::Live {
            provider,
            tool_defs: tools.iter().map(ToolDescriptor::function_def).collect(),
            system_prompt: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ModelBinding::Unavailable {
            reason: reason.into(),
        }
    }

    /// Prepend a system message to every request.  No-op on the stub.
    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        match self {
            ModelBinding::Live {
                provider,
                tool_defs,
                ..
            } => ModelBinding::Live {
                provider,
                tool_defs,
                system_prompt: Some(prompt.into()),
            },
            stub => stub,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ModelBinding::Live { .. })
    }

    /// Human-readable backend label for banners.
    pub fn describe(&self) -> String {
        match self {
            ModelBinding::Live { provider, .. } => provider.name().to_string(),
            ModelBinding::Unavailable { reason } => format!("unavailable ({reason})"),
        }
    }

    /// Ask the model for the next assistant message.
    ///
    /// Backend failures are folded into an assistant message with no tool
    /// calls whose text starts with [`UNAVAILABLE_PREFIX`].
    pub async fn complete(&self, conversation: &[Message]) -> Message {
        match self {
            ModelBinding::Unavailable { reason } => {
                Message::assistant(format!("{UNAVAILABLE_PREFIX}: {reason}"))
            }
            ModelBinding::Live {
                provider,
                tool_defs,
                system_prompt,
            } => {
                let messages = to_chat_messages(system_prompt.as_deref(), conversation);
                match provider.send_chat_with_functions(&messages, tool_defs).await {
                    Ok((response, usage)) => {
                        if let Some(u) = usage {
                            debug!(
                                prompt_tokens = u.prompt_tokens,
                                completion_tokens = u.completion_tokens,
                                "model usage"
                            );
                        }
                        into_message(response)
                    }
                    Err(e) => {
                        warn!(provider = provider.name(), error = %e, "model call failed");
                        Message::assistant(format!("{UNAVAILABLE_PREFIX}: {e:#}"))
                    }
                }
            }
        }
    }
}

/// Convert conversation messages into the provider wire shape.
pub fn to_chat_messages(system_prompt: Option<&str>, conversation: &[Message]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(conversation.len() + 1);
    if let Some(prompt) = system_prompt {
        out.push(ChatMessage::new("system", prompt));
    }
    for m in conversation {
        let chat = match m {
            Message::Human { content } => ChatMessage::new("user", content.clone()),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut msg = ChatMessage::new("assistant", content.clone());
                if !tool_calls.is_empty() {
                    msg.tool_calls = Some(
                        tool_calls
                            .iter()
                            .map(|tc| {
                                json!({
                                    "id": tc.id,
                                    "type": "function",
                                    "function": {
                                        "name": tc.name,
                                        "arguments": tc.arguments.to_string(),
                                    }
                                })
                            })
                            .collect(),
                    );
                }
                msg
            }
            Message::ToolResult {
                call_id,
                name,
                content,
            } => ChatMessage {
                tool_call_id: Some(call_id.clone()),
                name: Some(name.clone()),
                ..ChatMessage::new("tool", content.clone())
            },
        };
        out.push(chat);
    }
    out
}

fn into_message(response: ProviderResponse) -> Message {
    match response {
        ProviderResponse::Final(text) => Message::assistant(text),
        ProviderResponse::ToolCalls { content, calls } => {
            // Results are paired by id, so ids must be unique per message.
            let mut seen = HashSet::new();
            let requests = calls
                .into_iter()
                .map(|c| {
                    let id = if c.id.is_empty() || seen.contains(&c.id) {
                        if !c.id.is_empty() {
                            debug!(id = %c.id, "replacing repeated tool call id");
                        }
                        crate::utils::synthetic_call_id()
                    } else {
                        c.id
                    };
                    seen.insert(id.clone());
                    let arguments = if c.arguments.trim().is_empty() {
                        json!({})
                    } else {
                        // Unparseable arguments are kept verbatim so the tool
                        // rejects them with a validation error.
                        serde_json::from_str(&c.arguments).unwrap_or(Value::String(c.arguments))
                    };
                    ToolCallRequest::new(id, c.name, arguments)
                })
                .collect();
            Message::assistant_with_calls(content, requests)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FunctionCallItem;

    #[tokio::test]
    async fn stub_reports_reason() {
        let binding = ModelBinding::unavailable("no model configured");
        let msg = binding.complete(&[Message::human("hi")]).await;
        assert!(msg.content().starts_with(UNAVAILABLE_PREFIX));
        assert!(msg.content().contains("no model configured"));
        assert!(!msg.requests_tools());
        assert!(!binding.is_live());
    }

    #[test]
    fn system_prompt_comes_first() {
        let msgs = to_chat_messages(Some("be brief"), &[Message::human("hi")]);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].role, "user");
    }

    #[test]
    fn tool_results_keep_call_id_and_name() {
        let conv = vec![
            Message::assistant_with_calls(
                "",
                vec![ToolCallRequest::new("c9", "linker", json!({"file_path": "a"}))],
            ),
            Message::tool_result("c9", "linker", "body"),
        ];
        let msgs = to_chat_messages(None, &conv);
        let tc = &msgs[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(tc["id"], "c9");
        assert_eq!(tc["function"]["arguments"], "{\"file_path\":\"a\"}");
        assert_eq!(msgs[1].tool_call_id.as_deref(), Some("c9"));
        assert_eq!(msgs[1].name.as_deref(), Some("linker"));
    }

    #[test]
    fn missing_ids_are_synthesised_and_bad_args_kept() {
        let msg = into_message(ProviderResponse::ToolCalls {
            content: String::new(),
            calls: vec![
                FunctionCallItem {
                    id: String::new(),
                    name: "read-file".into(),
                    arguments: "{\"file_path\":\"x\"}".into(),
                },
                FunctionCallItem {
                    id: "given".into(),
                    name: "linker".into(),
                    arguments: "not json".into(),
                },
            ],
        });
        let calls = msg.tool_calls();
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments["file_path"], "x");
        assert_eq!(calls[1].id, "given");
        assert_eq!(calls[1].arguments, Value::String("not json".into()));
    }

    #[test]
    fn repeated_ids_are_made_unique() {
        let item = |name: &str| FunctionCallItem {
            id: "dup".into(),
            name: name.into(),
            arguments: "{}".into(),
        };
        let msg = into_message(ProviderResponse::ToolCalls {
            content: String::new(),
            calls: vec![item("read-file"), item("linker"), item("linker")],
        });
        let ids: Vec<&str> = msg.tool_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids[0], "dup");
        assert!(ids[1].starts_with("call_"));
        assert!(ids[2].starts_with("call_"));
        assert_ne!(ids[1], ids[2]);
    }
}
