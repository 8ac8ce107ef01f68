//! Tool contract and registry.
//!
//! Every tool implements [`Tool`]: a static [`ToolDescriptor`] (name,
//! description, argument schema) plus an async `execute` that never
//! fails outright.  Problems are reported through an error-status
//! [`ToolOutput`] so the model can see and react to them.
//!
//! [`ToolRegistry::build`] assembles the fixed, ordered tool set for a
//! session.  Dispatch is a name lookup.

pub mod builtins;
pub mod process;

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::models::ModelProvider;

pub use crate::files::BackupStatus;

// ── Tool descriptor ──────────────────────────────────────────

/// Primitive argument type accepted by a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl ArgKind {
    fn json_type(&self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Number => "number",
            ArgKind::Boolean => "boolean",
        }
    }

    fn accepts(&self, v: &Value) -> bool {
        match self {
            ArgKind::String => v.is_string(),
            ArgKind::Integer => v.is_i64() || v.is_u64(),
            ArgKind::Number => v.is_number(),
            ArgKind::Boolean => v.is_boolean(),
        }
    }
}

/// One named argument of a tool.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    /// Blank strings are rejected.  Off for free-form text such as file
    /// contents, which may legitimately be empty.
    pub non_blank: bool,
    pub description: String,
}

/// Name, description and argument schema of a tool.  Immutable once built.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Dispatch key, unique within a registry (e.g. `"read-file"`).
    pub name: String,
    /// Shown to the model as part of its available actions.
    pub description: String,
    pub args: Vec<ArgSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            args: Vec::new(),
        }
    }

    pub fn required(mut self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            kind,
            required: true,
            non_blank: true,
            description: description.into(),
        });
        self
    }

    /// A required string that may be empty.
    pub fn required_text(mut self, name: &str, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            kind: ArgKind::String,
            required: true,
            non_blank: false,
            description: description.into(),
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            kind,
            required: false,
            non_blank: false,
            description: description.into(),
        });
        self
    }

    /// JSON Schema object for the arguments.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|a| {
                (
                    a.name.clone(),
                    json!({ "type": a.kind.json_type(), "description": a.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    /// Function definition in the chat-completions `tools` format.
    pub fn function_def(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.json_schema(),
            }
        })
    }

    /// Check `args` against the schema.
    ///
    /// Rejects non-objects, unknown keys, missing required arguments,
    /// blank path-like arguments, and values of the wrong type.  `null`
    /// counts as absent.
    pub fn validate<'a>(&self, args: &'a Value) -> Result<&'a Map<String, Value>, String> {
        let map = args
            .as_object()
            .ok_or_else(|| format!("arguments must be a JSON object, got: {args}"))?;

        if let Some(unknown) = map.keys().find(|k| !self.args.iter().any(|a| &a.name == *k)) {
            return Err(format!("unknown argument '{unknown}'"));
        }

        for spec in &self.args {
            match map.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(format!("missing required argument '{}'", spec.name));
                    }
                }
                Some(v) => {
                    if !spec.kind.accepts(v) {
                        return Err(format!(
                            "argument '{}' must be of type {}",
                            spec.name,
                            spec.kind.json_type()
                        ));
                    }
                    if spec.non_blank && v.as_str().is_some_and(|s| s.trim().is_empty()) {
                        return Err(format!("'{}' cannot be empty.", spec.name));
                    }
                }
            }
        }
        Ok(map)
    }
}

// ── Invocation result ────────────────────────────────────────

/// Status tag carried by a [`FileObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Error,
    Created,
    EditedReplace,
    EditedAppend,
    EditedPatch,
    Formatted,
    Read,
    Exists,
    Appended,
    Replaced,
    Analysed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Error => "error",
            FileStatus::Created => "created",
            FileStatus::EditedReplace => "edited_replace",
            FileStatus::EditedAppend => "edited_append",
            FileStatus::EditedPatch => "edited_patch",
            FileStatus::Formatted => "formatted",
            FileStatus::Read => "read",
            FileStatus::Exists => "exists",
            FileStatus::Appended => "appended",
            FileStatus::Replaced => "replaced",
            FileStatus::Analysed => "analysed",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a file taken by a tool.  Informational only.
#[derive(Debug, Clone, Serialize)]
pub struct FileObject {
    pub path: PathBuf,
    pub contents: String,
    pub status: FileStatus,
    /// Outcome of the pre-write backup, for tools that overwrite.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupStatus>,
}

impl FileObject {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            status,
            backup: None,
        }
    }

    pub fn with_backup(mut self, backup: BackupStatus) -> Self {
        self.backup = Some(backup);
        self
    }
}

/// Status text plus optional artifact.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Fed back to the model as the tool-result content.
    pub status: String,
    pub artifact: Option<FileObject>,
    pub failed: bool,
}

impl ToolOutput {
    pub fn success(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            artifact: None,
            failed: false,
        }
    }

    /// Error result with caller-formatted status text.
    pub fn failure(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            artifact: None,
            failed: true,
        }
    }

    /// Error result rendered as `❌ Error: <msg>`.
    pub fn error(msg: impl fmt::Display) -> Self {
        Self::failure(format!("❌ Error: {msg}"))
    }

    pub fn with_artifact(mut self, artifact: FileObject) -> Self {
        self.artifact = Some(artifact);
        self
    }
}

impl From<anyhow::Error> for ToolOutput {
    fn from(e: anyhow::Error) -> Self {
        ToolOutput::error(format!("{e:#}"))
    }
}

// ── Tool contract ────────────────────────────────────────────

/// Trait implemented by every tool the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn describe(&self) -> &ToolDescriptor;

    /// Run with arguments that already passed schema validation.
    async fn execute(&self, args: &Map<String, Value>) -> ToolOutput;

    /// Validate `args` against the descriptor, then execute.
    async fn invoke(&self, args: &Value) -> ToolOutput {
        match self.describe().validate(args) {
            Ok(map) => self.execute(map).await,
            Err(msg) => ToolOutput::error(format!(
                "invalid arguments for '{}': {msg}",
                self.describe().name
            )),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────

/// Ordered, name-indexed tool set for one session.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Assemble the default tools rooted at `root`.
    ///
    /// Tools that need a model (search-explain, generate-test, notebook,
    /// general-chat) are omitted when `model` is `None`.
    pub fn build(root: &Path, model: Option<Arc<dyn ModelProvider>>) -> Self {
        use builtins::*;

        let root = root.to_path_buf();
        let mut reg = Self::default();
        reg.insert(Arc::new(read_file::ReadFileTool::new(root.clone())));
        reg.insert(Arc::new(edit_file::EditFileTool::new(root.clone())));
        if let Some(ref m) = model {
            reg.insert(Arc::new(search_explain::SearchExplainTool::new(
                root.clone(),
                m.clone(),
            )));
        }
        reg.insert(Arc::new(linker::LinkerTool::new(root.clone())));
        reg.insert(Arc::new(new_file::NewFileTool::new(root.clone())));
        if let Some(ref m) = model {
            reg.insert(Arc::new(generate_test::GenerateTestTool::new(
                root.clone(),
                m.clone(),
            )));
        }
        reg.insert(Arc::new(format_code::FormatCodeTool::new(root.clone())));
        if model.is_some() {
            reg.insert(Arc::new(notebook::NotebookTool::new(root.clone())));
        }
        reg.insert(Arc::new(py2ipynb::Py2IpynbTool::new(root.clone())));
        if let Some(ref m) = model {
            reg.insert(Arc::new(general_chat::GeneralChatTool::new(m.clone())));
        }
        reg.insert(Arc::new(r_script::RScriptTool::new(root)));
        reg
    }

    /// Add a tool.  Fails if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> anyhow::Result<()> {
        let name = tool.describe().name.clone();
        if self.index.contains_key(&name) {
            anyhow::bail!("duplicate tool name: {name}");
        }
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// First registration wins.
    fn insert(&mut self, tool: Arc<dyn Tool>) {
        if let Err(e) = self.register(tool) {
            warn!(error = %e, "skipping tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.describe().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.describe().name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ── Root containment ─────────────────────────────────────────

/// Resolve `raw` against `root` and ensure the result lives inside it.
/// Returns the canonicalized path on success.
///
/// `..` components are rejected outright; absolute paths are accepted
/// only when they point inside the root.
pub fn resolve_in_root(root: &Path, raw: &str) -> anyhow::Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        anyhow::bail!("path cannot be empty");
    }
    let rel = Path::new(raw);
    if rel.components().any(|c| matches!(c, Component::ParentDir)) {
        anyhow::bail!("path traversal ('..') is not allowed: {raw}");
    }

    let root_canon = root
        .canonicalize()
        .with_context(|| format!("root directory {} is not accessible", root.display()))?;

    let candidate = if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        root_canon.join(rel)
    };

    // The target may not exist yet (new-file): canonicalize the longest
    // existing ancestor so symlinks cannot smuggle the path out.
    let resolved = canon_or_resolve(&candidate)?;

    if !resolved.starts_with(&root_canon) {
        anyhow::bail!(
            "path escapes root directory: {} is not under {}",
            resolved.display(),
            root_canon.display()
        );
    }

    Ok(resolved)
}

/// Best-effort canonicalize: if the full path doesn't exist yet,
/// canonicalize the longest existing prefix and append the rest.
pub(crate) fn canon_or_resolve(p: &Path) -> anyhow::Result<PathBuf> {
    if p.exists() {
        return Ok(p.canonicalize()?);
    }
    let mut existing = p.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        if let Some(file) = existing.file_name() {
            tail.push(file.to_os_string());
        } else {
            anyhow::bail!("cannot resolve path: {}", p.display());
        }
        existing = existing
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cannot resolve path: {}", p.display()))?
            .to_path_buf();
    }
    let mut resolved = existing.canonicalize()?;
    for component in tail.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

/// Truncate a UTF-8 `String` to at most `max_bytes` on a char boundary,
/// returning the (possibly shortened) owned `String`.
pub(crate) fn truncate_utf8_owned(mut s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    s
}

// ── Argument accessors ───────────────────────────────────────

pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// A required, non-blank string argument.
pub(crate) fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    str_arg(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("'{key}' cannot be empty."))
}

pub(crate) fn bool_arg(args: &Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn u64_arg(args: &Map<String, Value>, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}
