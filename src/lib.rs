//! code_agent: local developer assistant driven by a tool-calling chat model.
//!
//! This library crate re-exports modules so integration tests
//! (under `tests/`) can access them.

pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod files;
pub mod models;
pub mod session;
pub mod shell;
pub mod tools;
pub mod utils;

/// Return the code-agent home directory.
///
/// Resolution order:
/// 1. `CODE_AGENT_HOME` environment variable
/// 2. `$HOME/.code_agent`
pub fn code_agent_home() -> std::path::PathBuf {
    if let Ok(p) = std::env::var("CODE_AGENT_HOME") {
        std::path::PathBuf::from(p)
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".code_agent")
    }
}
