//! `notebook`: create or edit Jupyter notebooks.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::files::{atomic_write, backup_file};
use crate::files::notebook::{markdown_cell, new_notebook, parse_notebook, push_cell, to_pretty_json};
use crate::tools::{
    required_str, resolve_in_root, str_arg, ArgKind, FileObject, FileStatus, Tool,
    ToolDescriptor, ToolOutput,
};

fn single_markdown(content: &str) -> anyhow::Result<Value> {
    let mut nb = new_notebook();
    push_cell(&mut nb, markdown_cell(content))?;
    Ok(nb)
}

pub struct NotebookTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl NotebookTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "notebook",
            "Create or edit Jupyter notebooks (.ipynb). Mode create: create a minimal notebook; \
             append: add a markdown cell with content; replace: replace entire notebook with \
             given content.",
        )
        .required("file_path", ArgKind::String, "Path to the notebook to create or edit")
        .optional("content", ArgKind::String, "Markdown or code content to insert")
        .optional("mode", ArgKind::String, "Mode: create|append|replace (default create)");
        Self { root, descriptor }
    }

    async fn edit(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let path = resolve_in_root(&self.root, required_str(args, "file_path")?)?;
        let content = str_arg(args, "content").unwrap_or_default();
        let mode = str_arg(args, "mode").unwrap_or("create");

        let (nb, verb, status) = match mode {
            "create" => (single_markdown(content)?, "Created", FileStatus::Created),
            "append" => {
                if !path.is_file() {
                    return Ok(ToolOutput::failure(format!(
                        "❌ Notebook not found: {}",
                        path.display()
                    ))
                    .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
                }
                let text = tokio::fs::read_to_string(&path).await?;
                let mut nb = parse_notebook(&text).ok_or_else(|| {
                    anyhow::anyhow!("Notebook operation failed: {} is not a v4 notebook", path.display())
                })?;
                push_cell(&mut nb, markdown_cell(content))?;
                (nb, "Appended", FileStatus::Appended)
            }
            // Raw notebook JSON is written as-is; anything else becomes a
            // single markdown cell.
            "replace" => (
                match parse_notebook(content) {
                    Some(nb) => nb,
                    None => single_markdown(content)?,
                },
                "Replaced",
                FileStatus::Replaced,
            ),
            other => {
                return Ok(ToolOutput::failure(format!("❌ Unknown mode: {other}"))
                    .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
            }
        };

        let backup = backup_file(&path).await;
        atomic_write(&path, to_pretty_json(&nb)?).await?;
        Ok(ToolOutput::success(format!(
            "✅ {verb} notebook {}{}",
            path.display(),
            backup.note()
        ))
        .with_artifact(FileObject::new(path, content, status).with_backup(backup)))
    }
}

#[async_trait]
impl Tool for NotebookTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.edit(args).await.unwrap_or_else(ToolOutput::from)
    }
}
