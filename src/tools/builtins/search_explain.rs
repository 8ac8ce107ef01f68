//! `search-explain`: grep the tree under the root and have the model
//! explain what it found.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use tracing::debug;

use crate::files::notebook::{cell_sources, parse_notebook};
use crate::models::{ChatMessage, ModelProvider};
use crate::tools::{
    required_str, u64_arg, ArgKind, FileObject, FileStatus, Tool, ToolDescriptor, ToolOutput,
};
use crate::utils::take_chars;

/// Directory names never descended into.
const SKIP_DIRS: &[&str] = &[".venv", "venv", "node_modules", "packrat", "archive", "output"];
const MAX_FILE_BYTES: u64 = 2_000_000;
const SNIPPET_CHARS: usize = 600;
const NOTEBOOK_PREVIEW_CHARS: usize = 1000;

const ANALYST_PROMPT: &str = "You are an expert code analyst. Provide a comprehensive analysis \
of the following code snippets. Include: 1) Overall purpose and functionality, 2) Key design \
patterns and architectural decisions, 3) Potential issues or improvements, 4) Dependencies and \
relationships between files, 5) Best practices being followed or violated. Be thorough and \
detailed.\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub path: PathBuf,
    pub snippet: String,
}

/// Case-insensitive regex, or a lowercase literal when the query is not a
/// valid pattern.
enum Matcher {
    Regex(Regex),
    Literal(String),
}

impl Matcher {
    fn new(query: &str) -> Self {
        match RegexBuilder::new(query).case_insensitive(true).build() {
            Ok(re) => Matcher::Regex(re),
            Err(e) => {
                debug!(query, error = %e, "invalid regex, falling back to substring search");
                Matcher::Literal(query.to_lowercase())
            }
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Regex(re) => re.is_match(text),
            Matcher::Literal(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Searchable text of a file: notebooks contribute their cell sources,
/// everything else its UTF-8 text.  `None` for unreadable files.
fn searchable_text(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    if path.extension().is_some_and(|e| e == "ipynb") {
        let nb = parse_notebook(&text)?;
        return Some(take_chars(&cell_sources(&nb), NOTEBOOK_PREVIEW_CHARS).to_string());
    }
    Some(text)
}

/// Walk `root` and collect up to `max_results` matching files.
pub fn gather_hits(root: &Path, query: &str, max_results: usize) -> Vec<Hit> {
    let matcher = Matcher::new(query);
    let walker = ignore::WalkBuilder::new(root)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            !entry
                .file_name()
                .to_str()
                .is_some_and(|name| SKIP_DIRS.contains(&name))
        })
        .build();

    let mut hits = Vec::new();
    for entry in walker.flatten() {
        if hits.len() >= max_results {
            break;
        }
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if entry.metadata().map_or(true, |m| m.len() > MAX_FILE_BYTES) {
            continue;
        }
        let Some(text) = searchable_text(entry.path()) else {
            continue;
        };
        if matcher.is_match(&text) {
            hits.push(Hit {
                path: entry.path().to_path_buf(),
                snippet: take_chars(&text, SNIPPET_CHARS).replace('\n', " "),
            });
        }
    }
    hits
}

fn analysis_prompt(hits: &[Hit]) -> String {
    let snippets = hits
        .iter()
        .map(|h| format!("File: {}\nSnippet:\n{}", h.path.display(), h.snippet))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{ANALYST_PROMPT}{snippets}")
}

pub struct SearchExplainTool {
    root: PathBuf,
    model: Arc<dyn ModelProvider>,
    descriptor: ToolDescriptor,
}

impl SearchExplainTool {
    pub fn new(root: PathBuf, model: Arc<dyn ModelProvider>) -> Self {
        let descriptor = ToolDescriptor::new(
            "search-explain",
            "Search for a specific string or pattern in local text files and summarise \
             the snippets (and their file names). Returns the summary and the first hit's path.",
        )
        .required("search_query", ArgKind::String, "Term or regexp to search")
        .optional(
            "max_results",
            ArgKind::Integer,
            "Maximum number of hits to return (default 10)",
        );
        Self {
            root,
            model,
            descriptor,
        }
    }

    async fn search(&self, args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let query = required_str(args, "search_query")?.to_string();
        let max_results = u64_arg(args, "max_results", 10).max(1) as usize;

        let root = self.root.clone();
        let hits = tokio::task::spawn_blocking(move || gather_hits(&root, &query, max_results))
            .await
            .context("search task panicked")?;
        debug!(hits = hits.len(), "search finished");

        let Some(first) = hits.first() else {
            return Ok(ToolOutput::failure("❌ No matches found."));
        };

        let prompt = analysis_prompt(&hits);
        let summary = self
            .model
            .send_chat(&[ChatMessage::new("user", prompt)])
            .await
            .context("model summary failed")?;

        Ok(ToolOutput::success(summary)
            .with_artifact(FileObject::new(&first.path, "", FileStatus::Analysed)))
    }
}

#[async_trait]
impl Tool for SearchExplainTool {
    fn describe(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput {
        self.search(args).await.unwrap_or_else(ToolOutput::from)
    }
}
