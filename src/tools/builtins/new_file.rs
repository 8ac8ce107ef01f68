//! `new-file`: create a file with the given content.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::files::{atomic_write, backup_file, BackupStatus};
use crate::tools::{
    bool_arg, required_str, resolve_in_root, str_arg, ArgKind, FileObject, FileStatus, Tool,
    ToolDescriptor, ToolOutput,
};

pub struct NewFileTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl NewFileTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "new-file",
            "Use this tool to create a new file with specified content. \
             Provide a 'file_path' and the 'content' for the file. \
             Existing files are only replaced when 'overwrite' is true.",
        )
        .required(
            "file_path",
            ArgKind::String,
            "The full path, including the filename, where the new file should be created.",
        )
        .required_text("content", "The content to be written into the new file (may be empty).")
        .optional(
            "overwrite",
            ArgKind::Boolean,
            "Replace the file if it already exists (default false).",
        );
        Self { root, descriptor }
    }

    async fn create(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let path = resolve_in_root(&self.root, required_str(args, "file_path")?)?;
        let content = str_arg(args, "content").unwrap_or_default();
        let overwrite = bool_arg(args, "overwrite", false);

        let mut backup = BackupStatus::NoBackup;
        if path.exists() {
            if !overwrite {
                return Ok(ToolOutput::failure(format!(
                    "❌ File already exists: {}. Use 'overwrite=True' to replace it.",
                    path.display()
                ))
                .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
            }
            backup = backup_file(&path).await;
        }

        atomic_write(&path, content).await?;
        info!(path = %path.display(), ?backup, "file created");

        let message = format!("✅ Successfully created {}{}", path.display(), backup.note());
        Ok(ToolOutput::success(message)
            .with_artifact(FileObject::new(path, content, FileStatus::Created).with_backup(backup)))
    }
}

#[async_trait]
impl Tool for NewFileTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.create(args).await.unwrap_or_else(ToolOutput::from)
    }
}
