//! Minimal nbformat-4 notebook handling on top of `serde_json`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{json, Value};

const NBFORMAT: u64 = 4;
const NBFORMAT_MINOR: u64 = 4;

/// Empty notebook with the Python kernelspec.
pub fn new_notebook() -> Value {
    json!({
        "cells": [],
        "metadata": {
            "kernelspec": {
                "display_name": "Python 3",
                "language": "python",
                "name": "python3"
            },
            "language_info": { "name": "python" }
        },
        "nbformat": NBFORMAT,
        "nbformat_minor": NBFORMAT_MINOR
    })
}

pub fn markdown_cell(source: &str) -> Value {
    json!({
        "cell_type": "markdown",
        "metadata": {},
        "source": source
    })
}

pub fn code_cell(source: &str) -> Value {
    json!({
        "cell_type": "code",
        "execution_count": null,
        "metadata": {},
        "outputs": [],
        "source": source
    })
}

/// Append a cell to `nb`.  Fails when `nb` has no `cells` array.
pub fn push_cell(nb: &mut Value, cell: Value) -> anyhow::Result<()> {
    nb.get_mut("cells")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| anyhow::anyhow!("notebook has no `cells` array"))?
        .push(cell);
    Ok(())
}

/// Parse text as a v4 notebook.  Returns `None` unless it is a JSON object
/// with a `cells` array and `nbformat` 4.
pub fn parse_notebook(text: &str) -> Option<Value> {
    let nb: Value = serde_json::from_str(text).ok()?;
    nb.get("cells")?.as_array()?;
    (nb.get("nbformat")?.as_u64()? == NBFORMAT).then_some(nb)
}

/// Joined cell sources (markdown and code), one cell per line block.
pub fn cell_sources(nb: &Value) -> String {
    let Some(cells) = nb.get("cells").and_then(Value::as_array) else {
        return String::new();
    };
    cells
        .iter()
        .filter(|c| matches!(c["cell_type"].as_str(), Some("markdown") | Some("code")))
        .map(|c| source_text(&c["source"]))
        .collect::<Vec<_>>()
        .join("\n")
}

/// nbformat allows `source` as a string or a list of lines.
fn source_text(source: &Value) -> String {
    match source {
        Value::String(s) => s.clone(),
        Value::Array(lines) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

pub fn to_pretty_json(nb: &Value) -> anyhow::Result<String> {
    let mut text = serde_json::to_string_pretty(nb).context("serialize notebook")?;
    text.push('\n');
    Ok(text)
}

/// Split a script on `# %%` marker lines.  Marker lines are dropped; an
/// empty script yields a single `"\n"` cell.
pub fn split_cells(script: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    for line in script.split_inclusive('\n') {
        if line.trim_start().starts_with("# %%") {
            if !current.is_empty() {
                cells.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        cells.push(current);
    }
    if cells.is_empty() {
        cells.push("\n".to_string());
    }
    cells
}

/// Notebook with one code cell per `# %%` section of `script`.
pub fn script_to_notebook(script: &str) -> Value {
    let mut nb = new_notebook();
    if let Some(cells) = nb["cells"].as_array_mut() {
        cells.extend(split_cells(script).iter().map(|c| code_cell(c)));
    }
    nb
}

/// Convert a Python script to a notebook file.
///
/// `output` defaults to `src` with an `.ipynb` extension.  Returns the
/// written path.
pub async fn py_to_ipynb(src: &Path, output: Option<&Path>) -> anyhow::Result<PathBuf> {
    if !src.is_file() {
        anyhow::bail!("Python file {} does not exist", src.display());
    }
    let script = tokio::fs::read_to_string(src)
        .await
        .with_context(|| format!("read {}", src.display()))?;
    let dst = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| src.with_extension("ipynb"));
    let text = to_pretty_json(&script_to_notebook(&script))?;
    super::atomic_write(&dst, text)
        .await
        .with_context(|| format!("failed to write notebook {}", dst.display()))?;
    Ok(dst)
}
