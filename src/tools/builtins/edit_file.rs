//! `edit-file`: rewrite an existing file by replacing, appending or
//! patching its content.
//!
//! Modes:
//! - `"replace"` (default): the new content becomes the whole file
//! - `"append"`: the new content is added at the end
//! - `"patch"`: the region between [`AUTOGEN_START`] and [`AUTOGEN_END`]
//!   is replaced; without markers the content is appended on a new line
//!
//! The previous file is copied to `<file>.bak` before the write.  A
//! failed backup is reported in the status text but does not stop the
//! edit.  With `preview: true` nothing is written and a unified diff of
//! the proposed change is returned instead.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use super::read_existing;
use crate::files::{atomic_write, backup_file, unified_diff, BackupStatus};
use crate::tools::{
    bool_arg, required_str, resolve_in_root, str_arg, ArgKind, FileObject, FileStatus, Tool,
    ToolDescriptor, ToolOutput,
};

pub const AUTOGEN_START: &str = "<!-- AUTOGEN START -->";
pub const AUTOGEN_END: &str = "<!-- AUTOGEN END -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Replace,
    Append,
    Patch,
}

impl EditMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "replace" => Some(EditMode::Replace),
            "append" => Some(EditMode::Append),
            "patch" => Some(EditMode::Patch),
            _ => None,
        }
    }

    fn status(&self) -> FileStatus {
        match self {
            EditMode::Replace => FileStatus::EditedReplace,
            EditMode::Append => FileStatus::EditedAppend,
            EditMode::Patch => FileStatus::EditedPatch,
        }
    }

    /// New file text for `original` after applying `content`.
    pub fn apply(&self, original: &str, content: &str) -> String {
        match self {
            EditMode::Replace => content.to_string(),
            EditMode::Append => format!("{original}{content}"),
            EditMode::Patch => apply_patch(original, content),
        }
    }
}

/// Replace the text between the AUTOGEN markers, keeping the markers.
/// Falls back to appending `"\n" + content` when either marker is missing.
pub fn apply_patch(original: &str, content: &str) -> String {
    if let Some((pre, rest)) = original.split_once(AUTOGEN_START) {
        if let Some((_, post)) = rest.split_once(AUTOGEN_END) {
            return format!("{pre}{AUTOGEN_START}\n{content}\n{AUTOGEN_END}{post}");
        }
    }
    format!("{original}\n{content}")
}

pub struct EditFileTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl EditFileTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "edit-file",
            "Edit an existing file by replacing/appending/patching its content. \
             Set preview=true to get a unified diff without writing.",
        )
        .required("file_path", ArgKind::String, "Path to the file to edit.")
        .required_text("new_content", "New content for the file.")
        .optional("mode", ArgKind::String, "Mode: replace|append|patch (default replace).")
        .optional(
            "preview",
            ArgKind::Boolean,
            "If true, return a diff of the change instead of writing it.",
        );
        Self { root, descriptor }
    }

    async fn edit(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let raw = required_str(args, "file_path")?;
        let content = str_arg(args, "new_content").unwrap_or_default();
        let mode_name = str_arg(args, "mode").unwrap_or("replace");
        let path = resolve_in_root(&self.root, raw)?;

        let Some(mode) = EditMode::parse(mode_name) else {
            return Ok(ToolOutput::failure(format!("❌ Unknown mode: {mode_name}"))
                .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
        };

        let original = read_existing(&path).await?;
        let updated = mode.apply(&original, content);

        if bool_arg(args, "preview", false) {
            let diff = unified_diff(&original, &updated, raw);
            let text = if diff.is_empty() {
                format!("No changes for {}", path.display())
            } else {
                format!("Preview of {} ({mode_name}):\n{diff}", path.display())
            };
            return Ok(ToolOutput::success(text)
                .with_artifact(FileObject::new(&path, updated, FileStatus::Success)));
        }

        let backup = backup_file(&path).await;
        atomic_write(&path, updated.clone()).await?;

        let status = mode.status();
        info!(path = %path.display(), %status, ?backup, "file edited");
        let mut message = format!("✅ Successfully {status} {}", path.display());
        if backup == BackupStatus::BackupFailed {
            message.push_str(" (⚠️ Backup failed!)");
        }
        Ok(ToolOutput::success(message)
            .with_artifact(FileObject::new(&path, updated, status).with_backup(backup)))
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.edit(args).await.unwrap_or_else(ToolOutput::from)
    }
}
