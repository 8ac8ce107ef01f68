//! Tool-invocation control loop.
//!
//! One call to [`run_turn`] drives a conversation that already ends with a
//! human message through the states
//!
//! ```text
//! AwaitingModel ──tool calls──▶ DispatchingTools ──▶ AwaitingModel …
//!       │
//!       └──no tool calls──▶ Done
//! ```
//!
//! Tool calls of one assistant message run strictly in order, and every
//! request is answered by exactly one tool-result message carrying its
//! call id, including unknown tools, skipped calls and interrupted calls.
//! Failures never escape the loop: they become tool results or assistant
//! text that the model (and the operator) can see.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conversation::{Conversation, Message, ToolCallRequest};
use crate::models::ModelBinding;
use crate::tools::{FileObject, ToolRegistry};
use crate::utils::truncate_str;

/// Tool-result content for calls an interrupt kept from starting.
pub const INTERRUPTED_RESULT: &str = "interrupted";

/// Tool-result content for the call that was running when the interrupt
/// arrived.  Blocking work it handed off may still finish.
pub const INTERRUPTED_IN_FLIGHT_RESULT: &str = "interrupted (the operation may have completed)";

/// State of the control loop within one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    DispatchingTools,
    Done,
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced an assistant message without tool calls.
    Completed,
    /// The model kept asking for tools past `max_tool_rounds`.
    MaxRoundsExceeded,
    /// The cancellation token fired mid-turn.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct TurnOptions {
    /// Maximum number of tool-dispatch phases per turn.  `0` is unbounded.
    pub max_tool_rounds: usize,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: 25,
        }
    }
}

/// One executed (or synthesised) tool call.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub name: String,
    pub call_id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub artifact: Option<FileObject>,
}

/// Summary of one turn.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Final assistant message.  On [`TurnOutcome::Interrupted`] this is a
    /// notice that is not part of the conversation.
    pub final_message: Message,
    pub outcome: TurnOutcome,
    pub model_calls: usize,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl TurnReport {
    pub fn final_text(&self) -> &str {
        self.final_message.content()
    }
}

/// Run the loop until the model answers without tool calls, the round
/// budget is exhausted, or `cancel` fires.
pub async fn run_turn(
    binding: &ModelBinding,
    registry: &ToolRegistry,
    conversation: &mut Conversation,
    options: &TurnOptions,
    cancel: &CancellationToken,
) -> TurnReport {
    let mut state = LoopState::AwaitingModel;
    let mut model_calls = 0usize;
    let mut rounds = 0usize;
    let mut records = Vec::new();

    loop {
        match state {
            LoopState::AwaitingModel => {
                debug!(round = rounds, messages = conversation.len(), "awaiting model");
                let reply = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return interrupted(conversation, model_calls, records);
                    }
                    reply = binding.complete(conversation.snapshot()) => reply,
                };
                model_calls += 1;
                state = if reply.requests_tools() {
                    LoopState::DispatchingTools
                } else {
                    LoopState::Done
                };
                conversation.append(reply);
            }

            LoopState::DispatchingTools => {
                let pending = conversation.unanswered_calls();
                if options.max_tool_rounds > 0 && rounds >= options.max_tool_rounds {
                    warn!(
                        max_tool_rounds = options.max_tool_rounds,
                        "tool round budget exhausted"
                    );
                    for call in &pending {
                        conversation.append(Message::tool_result(
                            &call.id,
                            &call.name,
                            "skipped: tool round limit reached",
                        ));
                    }
                    let notice = Message::assistant(format!(
                        "Stopped after {} tool rounds without a final answer. \
                         Ask again to continue.",
                        options.max_tool_rounds
                    ));
                    conversation.append(notice.clone());
                    return TurnReport {
                        final_message: notice,
                        outcome: TurnOutcome::MaxRoundsExceeded,
                        model_calls,
                        tool_calls: records,
                    };
                }

                rounds += 1;
                debug!(round = rounds, calls = pending.len(), "dispatching tools");
                for call in pending {
                    if cancel.is_cancelled() {
                        return interrupted(conversation, model_calls, records);
                    }
                    let started = Instant::now();
                    let Some(record) = dispatch(registry, conversation, &call, cancel).await
                    else {
                        records.push(ToolCallRecord {
                            name: call.name.clone(),
                            call_id: call.id.clone(),
                            success: false,
                            duration_ms: started.elapsed().as_millis() as u64,
                            artifact: None,
                        });
                        return interrupted(conversation, model_calls, records);
                    };
                    records.push(ToolCallRecord {
                        duration_ms: started.elapsed().as_millis() as u64,
                        ..record
                    });
                }
                state = LoopState::AwaitingModel;
            }

            LoopState::Done => {
                let final_message = conversation
                    .last()
                    .cloned()
                    .unwrap_or_else(|| Message::assistant(""));
                info!(
                    model_calls,
                    tool_calls = records.len(),
                    rounds,
                    "turn completed"
                );
                return TurnReport {
                    final_message,
                    outcome: TurnOutcome::Completed,
                    model_calls,
                    tool_calls: records,
                };
            }
        }
    }
}

/// Run one tool call and append its result.  Returns `None` if the call
/// was cancelled while running; its result is then the in-flight notice.
async fn dispatch(
    registry: &ToolRegistry,
    conversation: &mut Conversation,
    call: &ToolCallRequest,
    cancel: &CancellationToken,
) -> Option<ToolCallRecord> {
    let (content, success, artifact) = match registry.get(&call.name) {
        Some(tool) => {
            debug!(tool = %call.name, call_id = %call.id, "invoking tool");
            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    conversation.append(Message::tool_result(
                        &call.id,
                        &call.name,
                        INTERRUPTED_IN_FLIGHT_RESULT,
                    ));
                    return None;
                }
                out = tool.invoke(&call.arguments) => out,
            };
            if output.failed {
                warn!(
                    tool = %call.name,
                    status = %truncate_str(&output.status, 200),
                    "tool reported an error"
                );
            }
            (output.status, !output.failed, output.artifact)
        }
        None => {
            warn!(tool = %call.name, "model requested an unknown tool");
            (format!("Error: unknown tool '{}'", call.name), false, None)
        }
    };

    conversation.append(Message::tool_result(&call.id, &call.name, content));
    Some(ToolCallRecord {
        name: call.name.clone(),
        call_id: call.id.clone(),
        success,
        duration_ms: 0,
        artifact,
    })
}

/// Close the turn after a cancellation: every request still waiting for a
/// result gets an [`INTERRUPTED_RESULT`] answer.
fn interrupted(
    conversation: &mut Conversation,
    model_calls: usize,
    mut records: Vec<ToolCallRecord>,
) -> TurnReport {
    for call in conversation.unanswered_calls() {
        conversation.append(Message::tool_result(&call.id, &call.name, INTERRUPTED_RESULT));
        records.push(ToolCallRecord {
            name: call.name,
            call_id: call.id,
            success: false,
            duration_ms: 0,
            artifact: None,
        });
    }
    info!(model_calls, "turn interrupted");
    TurnReport {
        final_message: Message::assistant("Turn interrupted."),
        outcome: TurnOutcome::Interrupted,
        model_calls,
        tool_calls: records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_model_finishes_in_one_call() {
        let binding = ModelBinding::unavailable("offline");
        let registry = ToolRegistry::default();
        let mut conv = Conversation::new();
        conv.append(Message::human("hello"));

        let report = run_turn(
            &binding,
            &registry,
            &mut conv,
            &TurnOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(report.outcome, TurnOutcome::Completed);
        assert_eq!(report.model_calls, 1);
        assert!(report.final_text().contains("offline"));
        assert_eq!(conv.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_model_call_leaves_history() {
        let binding = ModelBinding::unavailable("offline");
        let registry = ToolRegistry::default();
        let mut conv = Conversation::new();
        conv.append(Message::human("hello"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_turn(&binding, &registry, &mut conv, &TurnOptions::default(), &cancel)
            .await;
        assert_eq!(report.outcome, TurnOutcome::Interrupted);
        assert_eq!(report.model_calls, 0);
        assert_eq!(conv.len(), 1);
    }
}
