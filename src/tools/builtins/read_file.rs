//! `read-file`: return the full text of a file under the root.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::read_existing;
use crate::tools::{required_str, resolve_in_root, ArgKind, Tool, ToolDescriptor, ToolOutput};

pub struct ReadFileTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "read-file",
            "Use this tool to read the entire content of a file. \
             Provide a 'file_path' to the file you want to inspect.",
        )
        .required(
            "file_path",
            ArgKind::String,
            "Path of the file to read, relative to the root directory.",
        );
        Self { root, descriptor }
    }

    async fn read(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let raw = required_str(args, "file_path")?;
        let path = resolve_in_root(&self.root, raw)?;
        let content = read_existing(&path).await?;
        Ok(ToolOutput::success(format!(
            "Content of {raw}:\n\n---\n{content}\n---"
        )))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.read(args).await.unwrap_or_else(ToolOutput::from)
    }
}
