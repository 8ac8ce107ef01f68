//! `py2ipynb`: convert a `# %%`-delimited Python script to a notebook.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::files::backup_file;
use crate::files::notebook::py_to_ipynb;
use crate::tools::{
    required_str, resolve_in_root, str_arg, ArgKind, FileObject, FileStatus, Tool,
    ToolDescriptor, ToolOutput,
};

pub struct Py2IpynbTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl Py2IpynbTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "py2ipynb",
            "Convert a Python script into a Jupyter notebook. Each '# %%' marker starts \
             a new code cell.",
        )
        .required("file_path", ArgKind::String, "Path to the Python script")
        .optional(
            "output",
            ArgKind::String,
            "Notebook path to write (defaults to the script path with .ipynb)",
        );
        Self { root, descriptor }
    }

    async fn convert(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let src = resolve_in_root(&self.root, required_str(args, "file_path")?)?;
        let dst = match str_arg(args, "output").filter(|s| !s.trim().is_empty()) {
            Some(raw) => resolve_in_root(&self.root, raw)?,
            None => src.with_extension("ipynb"),
        };
        if !src.is_file() {
            anyhow::bail!("Python file {} does not exist", src.display());
        }

        let backup = backup_file(&dst).await;
        let written = py_to_ipynb(&src, Some(&dst)).await?;
        let contents = tokio::fs::read_to_string(&written).await.unwrap_or_default();
        Ok(ToolOutput::success(format!(
            "✅ Notebook written: {}{}",
            written.display(),
            backup.note()
        ))
        .with_artifact(
            FileObject::new(written, contents, FileStatus::Created).with_backup(backup),
        ))
    }
}

#[async_trait]
impl Tool for Py2IpynbTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.convert(args).await.unwrap_or_else(ToolOutput::from)
    }
}
