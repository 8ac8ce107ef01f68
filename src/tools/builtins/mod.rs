//! Built-in tool implementations.
//!
//! Each sub-module implements one tool.  Paths are always resolved
//! through [`resolve_in_root`](crate::tools::resolve_in_root).

pub mod edit_file;
pub mod format_code;
pub mod general_chat;
pub mod linker;
pub mod new_file;
pub mod notebook;
pub mod py2ipynb;
pub mod r_script;
pub mod read_file;
pub mod search_explain;

use std::path::Path;

/// Read a UTF-8 file that must already exist.
pub(crate) async fn read_existing(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        anyhow::bail!("File not found at {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!("Path exists but is not a file: {}", path.display());
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))
}

/// Strip a surrounding Markdown code fence from a model reply, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "python") on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, b)| b);
    body.strip_suffix("```").unwrap_or(body).trim_end()
}
