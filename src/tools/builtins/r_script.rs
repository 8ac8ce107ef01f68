//! `r-script`: execute a snippet of R code with `Rscript`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::process::{self, on_path, ProcessOutput};
use crate::tools::{required_str, ArgKind, Tool, ToolDescriptor, ToolOutput};

const RSCRIPT: &str = "Rscript";
const RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Render captured streams as `--- STDOUT ---` / `--- STDERR ---` blocks.
pub fn render_output(out: &ProcessOutput) -> String {
    let mut text = String::new();
    if !out.stdout.is_empty() {
        text.push_str(&format!("--- STDOUT ---\n{}\n", out.stdout));
    }
    if !out.stderr.is_empty() {
        text.push_str(&format!("--- STDERR ---\n{}\n", out.stderr));
    }
    if text.is_empty() {
        text.push_str("✅ R script executed with no output.");
    }
    text
}

pub struct RScriptTool {
    root: PathBuf,
    descriptor: ToolDescriptor,
}

impl RScriptTool {
    pub fn new(root: PathBuf) -> Self {
        let descriptor = ToolDescriptor::new(
            "r-script",
            "Use this tool to execute R code. Provide the R code as a string. \
             The tool will return the standard output and standard error.",
        )
        .required("code", ArgKind::String, "The R code to be executed.");
        Self { root, descriptor }
    }

    async fn run(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let code = required_str(args, "code")?;
        if !on_path(RSCRIPT) {
            return Ok(ToolOutput::failure(
                "❌ Error: 'Rscript' command not found. Please ensure R is installed and in \
                 your system's PATH.",
            ));
        }

        // Removed when `script` drops.
        let mut script = tempfile::Builder::new()
            .prefix("code-agent-")
            .suffix(".R")
            .tempfile()
            .context("create temporary R script")?;
        script
            .write_all(code.as_bytes())
            .and_then(|_| script.flush())
            .context("write temporary R script")?;
        let script_path = script.path().to_string_lossy().into_owned();

        let out = process::run(RSCRIPT, &[script_path.as_str()], &self.root, RUN_TIMEOUT).await?;
        Ok(ToolOutput::success(render_output(&out)))
    }
}

#[async_trait]
impl Tool for RScriptTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.run(args).await.unwrap_or_else(ToolOutput::from)
    }
}
