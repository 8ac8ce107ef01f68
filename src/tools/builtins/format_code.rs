//! `format-code`: run the project formatters over one file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::read_existing;
use crate::tools::process::{self, on_path};
use crate::tools::{
    required_str, resolve_in_root, str_arg, ArgKind, FileObject, FileStatus, Tool,
    ToolDescriptor, ToolOutput,
};

const FORMAT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    Python,
    R,
}

/// Pick the formatter family from `mode`, consulting the extension for
/// `auto`.
fn language_for(mode: &str, path: &Path) -> Option<Language> {
    match mode {
        "python" => Some(Language::Python),
        "r" => Some(Language::R),
        "auto" => match path.extension().and_then(|e| e.to_str()) {
            Some("py") => Some(Language::Python),
            Some("r") | Some("R") => Some(Language::R),
            _ => None,
        },
        _ => None,
    }
}

pub struct FormatCodeTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl FormatCodeTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "format-code",
            "Format a source file. Python files are run through isort and black, \
             R files through styler, when those tools are installed.",
        )
        .required("file_path", ArgKind::String, "Path to the file to format")
        .optional("mode", ArgKind::String, "Mode: auto|python|r (default auto)");
        Self { root, descriptor }
    }

    async fn run_formatter(&self, program: &str, args: &[&str]) -> anyhow::Result<()> {
        let out = process::run(program, args, &self.root, FORMAT_TIMEOUT).await?;
        debug!(program, code = ?out.exit_code, "formatter finished");
        if !out.success() {
            let detail = if out.stderr.is_empty() { out.stdout } else { out.stderr };
            anyhow::bail!("{program} exited with {:?}: {detail}", out.exit_code);
        }
        Ok(())
    }

    async fn format_python(&self, path: &Path) -> anyhow::Result<()> {
        let target = path.to_string_lossy();
        let mut ran = false;
        for program in ["isort", "black"] {
            if on_path(program) {
                self.run_formatter(program, &[target.as_ref()]).await?;
                ran = true;
            }
        }
        if !ran {
            anyhow::bail!("no Python formatter (isort, black) found on PATH");
        }
        Ok(())
    }

    async fn format_r(&self, path: &Path) -> anyhow::Result<()> {
        if !on_path("Rscript") {
            anyhow::bail!("'Rscript' not found on PATH");
        }
        // Single quotes delimit the R string literal.
        let escaped = path.to_string_lossy().replace('\\', "\\\\").replace('\'', "\\'");
        let expr = format!("styler::style_file('{escaped}')");
        self.run_formatter("Rscript", &["-e", &expr]).await
    }

    async fn format(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let path = resolve_in_root(&self.root, required_str(args, "file_path")?)?;
        let mode = str_arg(args, "mode").unwrap_or("auto");
        if !path.is_file() {
            return Ok(ToolOutput::failure(format!("❌ File not found: {}", path.display()))
                .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
        }

        let result = match language_for(mode, &path) {
            Some(Language::Python) => self.format_python(&path).await,
            Some(Language::R) => self.format_r(&path).await,
            None => {
                return Ok(ToolOutput::failure(format!("❌ Unknown mode: {mode}"))
                    .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
            }
        };
        if let Err(e) = result {
            return Ok(ToolOutput::failure(format!("❌ Formatting failed: {e:#}"))
                .with_artifact(FileObject::new(&path, "", FileStatus::Error)));
        }

        let contents = read_existing(&path).await?;
        Ok(ToolOutput::success(format!("✅ Formatted {}", path.display()))
            .with_artifact(FileObject::new(path, contents, FileStatus::Formatted)))
    }
}

#[async_trait]
impl Tool for FormatCodeTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.format(args).await.unwrap_or_else(ToolOutput::from)
    }
}
