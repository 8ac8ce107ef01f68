//! Persisted session state: `SessionState`, `HistoryEntry`, and
//! `StateStore`.
//!
//! The state file is a single JSON document
//! `{"conversation_history": [{role, content}, …], "settings": {…}}`.
//! Only human messages and final assistant answers are stored; tool
//! traffic stays in memory.  A missing or unreadable file degrades to an
//! empty state with a warning, never an error.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, warn};

use crate::conversation::{Conversation, Message, Role};
use crate::files::atomic_write;

// ── HistoryEntry ─────────────────────────────────────────────

/// One persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

// ── SessionState ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    /// Free-form operator settings, carried through unchanged.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl SessionState {
    /// Human messages and assistant messages that carry no tool calls.
    pub fn from_conversation(conversation: &Conversation, settings: Map<String, Value>) -> Self {
        let conversation_history = conversation
            .snapshot()
            .iter()
            .filter(|m| match m {
                Message::Human { .. } => true,
                Message::Assistant { .. } => !m.requests_tools(),
                Message::ToolResult { .. } => false,
            })
            .map(|m| HistoryEntry {
                role: m.role().as_str().to_string(),
                content: m.content().to_string(),
            })
            .collect();
        Self {
            conversation_history,
            settings,
        }
    }

    /// Rebuild a conversation.  Entries with unknown roles are skipped.
    pub fn to_conversation(&self) -> Conversation {
        let messages = self
            .conversation_history
            .iter()
            .filter_map(|e| match e.role.as_str() {
                r if r == Role::Human.as_str() => Some(Message::human(&e.content)),
                r if r == Role::Assistant.as_str() => Some(Message::assistant(&e.content)),
                other => {
                    debug!(role = other, "skipping history entry with unknown role");
                    None
                }
            })
            .collect();
        Conversation::from_messages(messages)
    }
}

// ── StateStore ───────────────────────────────────────────────

/// Load/save pair for one state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the state file.
    ///
    /// Returns an empty state plus a human-readable warning when the file
    /// is absent or cannot be parsed.
    pub async fn load(&self) -> (SessionState, Option<String>) {
        let text = match fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no saved state, starting fresh");
                return (
                    SessionState::default(),
                    Some(format!(
                        "No saved state at {}; starting with an empty history.",
                        self.path.display()
                    )),
                );
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read state file");
                return (
                    SessionState::default(),
                    Some(format!(
                        "Could not read {}: {e}; starting with an empty history.",
                        self.path.display()
                    )),
                );
            }
        };

        match serde_json::from_str::<SessionState>(&text) {
            Ok(state) => {
                debug!(
                    path = %self.path.display(),
                    entries = state.conversation_history.len(),
                    "state loaded"
                );
                (state, None)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "state file is corrupt");
                (
                    SessionState::default(),
                    Some(format!(
                        "State file {} is corrupt ({e}); starting with an empty history.",
                        self.path.display()
                    )),
                )
            }
        }
    }

    /// Write `state` atomically.  Last writer wins.
    pub async fn save(&self, state: &SessionState) -> anyhow::Result<()> {
        let mut text = serde_json::to_string_pretty(state).context("serialise session state")?;
        text.push('\n');
        atomic_write(&self.path, text)
            .await
            .with_context(|| format!("save state to {}", self.path.display()))?;
        debug!(
            path = %self.path.display(),
            entries = state.conversation_history.len(),
            "state saved"
        );
        Ok(())
    }
}
