//! Interactive session shell.
//!
//! [`Session`] is constructed by the entry point and owns everything one
//! chat needs: the tool registry, the model binding, the conversation and
//! the optional state store.  [`Session::handle_line`] is the whole shell
//! minus terminal I/O, which lives in [`run_repl`].

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{run_turn, TurnOptions, TurnReport};
use crate::conversation::{Conversation, Message};
use crate::models::ModelBinding;
use crate::session::{SessionState, StateStore};
use crate::tools::ToolRegistry;

pub const PROMPT: &str = "You: ";

const RULE: &str = "==================================================";

pub const HELP_TEXT: &str = "Available commands:\n\
- help: Show this help message\n\
- exit/quit/q: End the session\n\
- clear: Clear the conversation history\n\
- tools: List available tools\n\
\n\
You can also type natural language requests and the agent will try to help you.";

// ── Command parsing ──────────────────────────────────────────

/// A line of operator input, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand<'a> {
    Exit,
    Help,
    Clear,
    Tools,
    Empty,
    /// Anything else: forwarded to the control loop.
    Prompt(&'a str),
}

impl<'a> ShellCommand<'a> {
    /// Commands are matched case-insensitively after trimming.
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => ShellCommand::Empty,
            "exit" | "quit" | "q" => ShellCommand::Exit,
            "help" => ShellCommand::Help,
            "clear" => ShellCommand::Clear,
            "tools" => ShellCommand::Tools,
            _ => ShellCommand::Prompt(trimmed),
        }
    }
}

/// What the shell should print, and whether to keep going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellReply {
    Continue(String),
    Exit(String),
}

impl ShellReply {
    pub fn text(&self) -> &str {
        match self {
            ShellReply::Continue(t) | ShellReply::Exit(t) => t,
        }
    }
}

// ── Session ──────────────────────────────────────────────────

pub struct Session {
    root: PathBuf,
    registry: ToolRegistry,
    binding: ModelBinding,
    conversation: Conversation,
    settings: Map<String, Value>,
    store: Option<StateStore>,
    options: TurnOptions,
}

impl Session {
    pub fn new(
        root: impl Into<PathBuf>,
        registry: ToolRegistry,
        binding: ModelBinding,
        options: TurnOptions,
    ) -> Self {
        Self {
            root: root.into(),
            registry,
            binding,
            conversation: Conversation::new(),
            settings: Map::new(),
            store: None,
            options,
        }
    }

    /// Persist history to `store` after every turn and on `clear`.
    pub fn with_store(mut self, store: StateStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Seed the conversation from the store.  Returns the load warning, if
    /// any, for the operator.
    pub async fn restore(&mut self) -> Option<String> {
        let store = self.store.as_ref()?;
        let (state, warning) = store.load().await;
        self.conversation = state.to_conversation();
        self.settings = state.settings;
        debug!(messages = self.conversation.len(), "conversation restored");
        warning
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn banner(&self) -> String {
        format!(
            "{RULE}\n=== Code Agent Chat ===\n\
             Type 'exit', 'quit', or 'q' to end the session.\n\
             Type 'help' to see available commands.\n\n\
             Root directory: {}\n\
             Model: {}\n\
             Available tools: {}\n{RULE}",
            self.root.display(),
            self.binding.describe(),
            self.registry.names().join(", "),
        )
    }

    pub fn tools_listing(&self) -> String {
        let mut out = String::from("Available tools:");
        for tool in self.registry.iter() {
            let d = tool.describe();
            out.push_str(&format!("\n- {}: {}", d.name, d.description.trim()));
        }
        out
    }

    /// Handle one line of input.  Lifecycle commands never reach the model.
    pub async fn handle_line(&mut self, line: &str, cancel: &CancellationToken) -> ShellReply {
        match ShellCommand::parse(line) {
            ShellCommand::Empty => ShellReply::Continue(String::new()),
            ShellCommand::Exit => ShellReply::Exit("Goodbye!".into()),
            ShellCommand::Help => ShellReply::Continue(HELP_TEXT.into()),
            ShellCommand::Tools => ShellReply::Continue(self.tools_listing()),
            ShellCommand::Clear => {
                self.conversation.clear();
                let mut text = String::from("Conversation history cleared.");
                if let Some(w) = self.persist().await {
                    text.push_str(&format!("\n{w}"));
                }
                ShellReply::Continue(text)
            }
            ShellCommand::Prompt(prompt) => {
                let report = self.turn(prompt, cancel).await;
                let mut text = render_report(&report);
                if let Some(w) = self.persist().await {
                    text.push_str(&format!("\n{w}"));
                }
                ShellReply::Continue(text)
            }
        }
    }

    /// Append `prompt` and run the control loop to completion.
    pub async fn turn(&mut self, prompt: &str, cancel: &CancellationToken) -> TurnReport {
        self.conversation.append(Message::human(prompt));
        run_turn(
            &self.binding,
            &self.registry,
            &mut self.conversation,
            &self.options,
            cancel,
        )
        .await
    }

    /// Save history if a store is attached.  Failures come back as a
    /// warning line, never as an error.
    async fn persist(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        let state = SessionState::from_conversation(&self.conversation, self.settings.clone());
        match store.save(&state).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, "failed to persist session state");
                Some(format!("⚠️ Could not save session state: {e:#}"))
            }
        }
    }
}

/// Final answer followed by one line per produced artifact.
pub fn render_report(report: &TurnReport) -> String {
    let mut out = report.final_text().to_string();
    for call in &report.tool_calls {
        if let Some(artifact) = &call.artifact {
            out.push_str(&format!(
                "\n  [{}] {}: {}",
                call.name,
                artifact.status,
                artifact.path.display()
            ));
        }
    }
    out
}

// ── Terminal loop ────────────────────────────────────────────

async fn print(out: &mut tokio::io::Stdout, text: &str) -> anyhow::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Read lines from stdin until `exit`, EOF or Ctrl-C at the prompt.
///
/// Ctrl-C while a turn is running cancels that turn only.
pub async fn run_repl(session: &mut Session) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print(&mut stdout, &format!("\n{}\n\n", session.banner())).await?;

    loop {
        print(&mut stdout, PROMPT).await?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                print(&mut stdout, "\n\nSession ended by user. Goodbye!\n").await?;
                return Ok(());
            }
        };
        let Some(line) = line else {
            print(&mut stdout, "\nGoodbye!\n").await?;
            return Ok(());
        };

        if matches!(ShellCommand::parse(&line), ShellCommand::Prompt(_)) {
            print(&mut stdout, "\nThinking...\n").await?;
        }

        let cancel = CancellationToken::new();
        let reply = {
            let handled = session.handle_line(&line, &cancel);
            tokio::pin!(handled);
            loop {
                tokio::select! {
                    reply = &mut handled => break reply,
                    _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                        debug!("interrupt received, cancelling turn");
                        cancel.cancel();
                    }
                }
            }
        };

        if !reply.text().is_empty() {
            print(&mut stdout, &format!("\n{}\n\n", reply.text())).await?;
        }
        if let ShellReply::Exit(_) = reply {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_case_insensitive() {
        assert_eq!(ShellCommand::parse("  QUIT "), ShellCommand::Exit);
        assert_eq!(ShellCommand::parse("q"), ShellCommand::Exit);
        assert_eq!(ShellCommand::parse("Help"), ShellCommand::Help);
        assert_eq!(ShellCommand::parse("clear"), ShellCommand::Clear);
        assert_eq!(ShellCommand::parse("tools"), ShellCommand::Tools);
        assert_eq!(ShellCommand::parse("   "), ShellCommand::Empty);
        assert_eq!(
            ShellCommand::parse(" tools please "),
            ShellCommand::Prompt("tools please")
        );
    }
}
