//! `linker`: hand the raw contents of a file back to the model so it
//! can be referenced or linked in a follow-up step.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::read_existing;
use crate::tools::{
    required_str, resolve_in_root, ArgKind, FileObject, FileStatus, Tool, ToolDescriptor,
    ToolOutput,
};

pub struct LinkerTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl LinkerTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "linker",
            "Load the raw contents of a file so it can be linked or referenced. \
             Returns the file text unchanged.",
        )
        .required(
            "file_path",
            ArgKind::String,
            "Path of the file to load, relative to the root directory.",
        );
        Self { root, descriptor }
    }

    async fn link(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let path = resolve_in_root(&self.root, required_str(args, "file_path")?)?;
        let content = read_existing(&path).await?;
        Ok(ToolOutput::success(content.clone())
            .with_artifact(FileObject::new(path, content, FileStatus::Read)))
    }
}

#[async_trait]
impl Tool for LinkerTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        match self.link(args).await {
            Ok(out) => out,
            Err(e) => ToolOutput::from(e),
        }
    }
}
