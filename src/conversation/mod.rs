//! Conversation state: the ordered, append-only message history shared
//! between the shell and the control loop.
//!
//! Messages are never mutated once appended.  The only way to shrink a
//! [`Conversation`] is [`Conversation::clear`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Message ──────────────────────────────────────────────────

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Opaque id used to pair the request with its tool result.
    pub id: String,
    /// Registry key of the tool to run.
    pub name: String,
    /// Argument mapping as emitted by the model.  Normally a JSON object;
    /// anything else fails schema validation at dispatch time.
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Role tag of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Human,
    Assistant,
    ToolResult,
}

impl Role {
    /// Wire name used in chat-completion payloads and the state file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "user",
            Role::Assistant => "assistant",
            Role::ToolResult => "tool",
        }
    }
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Human {
        content: String,
    },
    /// Model output.  `content` may be empty when the message only carries
    /// tool-call requests.
    Assistant {
        content: String,
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Answer to exactly one [`ToolCallRequest`] of the preceding assistant
    /// message.
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
        }
    }

    /// Assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Message::Human { .. } => Role::Human,
            Message::Assistant { .. } => Role::Assistant,
            Message::ToolResult { .. } => Role::ToolResult,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::Human { content }
            | Message::Assistant { content, .. }
            | Message::ToolResult { content, .. } => content,
        }
    }

    /// Tool-call requests carried by an assistant message (empty otherwise).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// True for an assistant message that asks for at least one tool call.
    pub fn requests_tools(&self) -> bool {
        !self.tool_calls().is_empty()
    }
}

// ── Conversation ─────────────────────────────────────────────

/// Ordered message history.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation from previously stored messages.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Read-only view of the history, oldest first.
    pub fn snapshot(&self) -> &[Message] {
        &self.messages
    }

    /// Drop every message.  Clearing an empty conversation is a no-op.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Requests of the most recent assistant message that have no tool
    /// result yet, in request order.
    pub fn unanswered_calls(&self) -> Vec<ToolCallRequest> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role() == Role::Assistant)
        else {
            return Vec::new();
        };
        let answered: Vec<&str> = self.messages[pos + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        self.messages[pos]
            .tool_calls()
            .iter()
            .filter(|req| !answered.contains(&req.id.as_str()))
            .cloned()
            .collect()
    }
}
