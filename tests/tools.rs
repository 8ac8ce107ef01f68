//! Integration tests for the built-in tools.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use code_agent::files::BackupStatus;
use code_agent::models::{ChatMessage, ModelProvider};
use code_agent::tools::{FileStatus, ToolOutput, ToolRegistry};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Helper: create a fresh temp workspace.
fn workspace() -> TempDir {
    tempfile::tempdir().expect("failed to create temp dir")
}

/// Model stub that answers every plain chat with a fixed reply and keeps
/// the prompts it was sent.
struct FixedReply {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl FixedReply {
    fn ok(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(msg.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for FixedReply {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error> {
        if let Some(m) = messages.last() {
            self.prompts.lock().unwrap().push(m.content.clone());
        }
        self.reply.clone().map_err(anyhow::Error::msg)
    }

    fn name(&self) -> &str {
        "fixed"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn file_tools(ws: &TempDir) -> ToolRegistry {
    ToolRegistry::build(ws.path(), None)
}

fn all_tools(ws: &TempDir, model: Arc<dyn ModelProvider>) -> ToolRegistry {
    ToolRegistry::build(ws.path(), Some(model))
}

async fn call(reg: &ToolRegistry, name: &str, args: Value) -> ToolOutput {
    reg.get(name)
        .unwrap_or_else(|| panic!("tool {name} not registered"))
        .invoke(&args)
        .await
}

fn read(ws: &TempDir, rel: &str) -> String {
    std::fs::read_to_string(ws.path().join(rel)).unwrap()
}

// ── registry ─────────────────────────────────────────────────

#[test]
fn registry_with_model_has_all_tools_in_order() {
    let ws = workspace();
    let reg = all_tools(&ws, FixedReply::ok("x"));
    assert_eq!(
        reg.names(),
        vec![
            "read-file",
            "edit-file",
            "search-explain",
            "linker",
            "new-file",
            "generate-test",
            "format-code",
            "notebook",
            "py2ipynb",
            "general-chat",
            "r-script",
        ]
    );
}

#[test]
fn every_descriptor_yields_function_schema() {
    let ws = workspace();
    let reg = all_tools(&ws, FixedReply::ok("x"));
    for d in reg.descriptors() {
        let def = d.function_def();
        assert_eq!(def["function"]["name"], d.name.as_str());
        assert_eq!(def["function"]["parameters"]["type"], "object");
        assert!(!d.description.is_empty());
    }
}

// ── read-file ────────────────────────────────────────────────

#[tokio::test]
async fn read_file_basic() {
    let ws = workspace();
    std::fs::write(ws.path().join("hello.txt"), "hello world").unwrap();

    let out = call(&file_tools(&ws), "read-file", json!({"file_path": "hello.txt"})).await;
    assert!(!out.failed);
    assert_eq!(out.status, "Content of hello.txt:\n\n---\nhello world\n---");
}

#[tokio::test]
async fn read_file_missing_returns_error() {
    let ws = workspace();
    let out = call(&file_tools(&ws), "read-file", json!({"file_path": "nope.txt"})).await;
    assert!(out.failed);
    assert!(out.status.starts_with("❌ Error: File not found"));
}

#[tokio::test]
async fn read_file_empty_path_rejected() {
    let ws = workspace();
    let out = call(&file_tools(&ws), "read-file", json!({"file_path": ""})).await;
    assert!(out.failed);
    assert!(out.status.contains("'file_path' cannot be empty."));
}

#[tokio::test]
async fn read_file_escape_blocked() {
    let ws = workspace();
    let reg = file_tools(&ws);
    let out = call(&reg, "read-file", json!({"file_path": "../../etc/passwd"})).await;
    assert!(out.failed);
    assert!(out.status.contains("not allowed"));
    let out = call(&reg, "read-file", json!({"file_path": "/etc/hostname"})).await;
    assert!(out.failed);
}

// ── linker ───────────────────────────────────────────────────

#[tokio::test]
async fn linker_returns_raw_contents() {
    let ws = workspace();
    std::fs::write(ws.path().join("lib.py"), "x = 1\n").unwrap();
    let out = call(&file_tools(&ws), "linker", json!({"file_path": "lib.py"})).await;
    assert_eq!(out.status, "x = 1\n");
    let artifact = out.artifact.unwrap();
    assert_eq!(artifact.status, FileStatus::Read);
    assert!(artifact.path.is_absolute());
}

// ── new-file ─────────────────────────────────────────────────

#[tokio::test]
async fn new_file_creates_parents() {
    let ws = workspace();
    let out = call(
        &file_tools(&ws),
        "new-file",
        json!({"file_path": "src/pkg/mod.py", "content": "# new\n"}),
    )
    .await;
    assert!(!out.failed, "{}", out.status);
    assert!(out.status.starts_with("✅ Successfully created"));
    assert_eq!(read(&ws, "src/pkg/mod.py"), "# new\n");
    let artifact = out.artifact.unwrap();
    assert_eq!(artifact.status, FileStatus::Created);
    assert_eq!(artifact.backup, Some(BackupStatus::NoBackup));
}

#[tokio::test]
async fn new_file_refuses_existing_without_overwrite() {
    let ws = workspace();
    std::fs::write(ws.path().join("a.py"), "old").unwrap();
    let out = call(
        &file_tools(&ws),
        "new-file",
        json!({"file_path": "a.py", "content": "new"}),
    )
    .await;
    assert!(out.failed);
    assert!(out.status.contains("Use 'overwrite=True' to replace it."));
    assert_eq!(read(&ws, "a.py"), "old");
}

#[tokio::test]
async fn new_file_overwrite_backs_up_original() {
    let ws = workspace();
    std::fs::write(ws.path().join("a.py"), "old").unwrap();
    let out = call(
        &file_tools(&ws),
        "new-file",
        json!({"file_path": "a.py", "content": "new", "overwrite": true}),
    )
    .await;
    assert!(out.status.ends_with("(Original backed up)"));
    assert_eq!(read(&ws, "a.py"), "new");
    assert_eq!(read(&ws, "a.py.bak"), "old");
    assert_eq!(out.artifact.unwrap().backup, Some(BackupStatus::BackupCreated));
}

#[tokio::test]
async fn new_file_accepts_empty_content() {
    let ws = workspace();
    let out = call(
        &file_tools(&ws),
        "new-file",
        json!({"file_path": "pkg/__init__.py", "content": ""}),
    )
    .await;
    assert!(!out.failed, "{}", out.status);
    assert_eq!(std::fs::metadata(ws.path().join("pkg/__init__.py")).unwrap().len(), 0);
}

#[tokio::test]
async fn new_file_still_rejects_blank_path() {
    let ws = workspace();
    let out = call(
        &file_tools(&ws),
        "new-file",
        json!({"file_path": " ", "content": ""}),
    )
    .await;
    assert!(out.failed);
    assert!(out.status.contains("'file_path' cannot be empty."));
}

// ── edit-file ────────────────────────────────────────────────

#[tokio::test]
async fn edit_file_modes() {
    let ws = workspace();
    let reg = file_tools(&ws);
    std::fs::write(ws.path().join("n.md"), "a").unwrap();

    let out = call(
        &reg,
        "edit-file",
        json!({"file_path": "n.md", "new_content": "b", "mode": "append"}),
    )
    .await;
    assert!(out.status.starts_with("✅ Successfully edited_append"));
    assert_eq!(read(&ws, "n.md"), "ab");
    assert_eq!(read(&ws, "n.md.bak"), "a");

    let out = call(&reg, "edit-file", json!({"file_path": "n.md", "new_content": "c"})).await;
    assert_eq!(out.artifact.unwrap().status, FileStatus::EditedReplace);
    assert_eq!(read(&ws, "n.md"), "c");
}

#[tokio::test]
async fn edit_file_patch_between_markers() {
    let ws = workspace();
    std::fs::write(
        ws.path().join("README.md"),
        "# Title\n<!-- AUTOGEN START -->\nstale\n<!-- AUTOGEN END -->\nfooter\n",
    )
    .unwrap();
    let out = call(
        &file_tools(&ws),
        "edit-file",
        json!({"file_path": "README.md", "new_content": "fresh", "mode": "patch"}),
    )
    .await;
    assert_eq!(out.artifact.unwrap().status, FileStatus::EditedPatch);
    assert_eq!(
        read(&ws, "README.md"),
        "# Title\n<!-- AUTOGEN START -->\nfresh\n<!-- AUTOGEN END -->\nfooter\n"
    );
}

#[tokio::test]
async fn edit_file_preview_does_not_write() {
    let ws = workspace();
    std::fs::write(ws.path().join("x.py"), "a = 1\n").unwrap();
    let out = call(
        &file_tools(&ws),
        "edit-file",
        json!({"file_path": "x.py", "new_content": "a = 2\n", "preview": true}),
    )
    .await;
    assert!(!out.failed);
    assert!(out.status.contains("-a = 1"));
    assert!(out.status.contains("+a = 2"));
    assert_eq!(read(&ws, "x.py"), "a = 1\n");
    assert!(!ws.path().join("x.py.bak").exists());
}

#[tokio::test]
async fn edit_file_rejects_unknown_mode_and_missing_file() {
    let ws = workspace();
    let reg = file_tools(&ws);
    let out = call(
        &reg,
        "edit-file",
        json!({"file_path": "ghost.py", "new_content": "x"}),
    )
    .await;
    assert!(out.failed);
    assert!(out.status.contains("File not found"));

    std::fs::write(ws.path().join("x.py"), "x").unwrap();
    let out = call(
        &reg,
        "edit-file",
        json!({"file_path": "x.py", "new_content": "y", "mode": "rewrite"}),
    )
    .await;
    assert_eq!(out.status, "❌ Unknown mode: rewrite");
    assert_eq!(read(&ws, "x.py"), "x");
}

#[tokio::test]
async fn edit_file_can_empty_a_file() {
    let ws = workspace();
    std::fs::write(ws.path().join("scratch.txt"), "junk").unwrap();
    let out = call(
        &file_tools(&ws),
        "edit-file",
        json!({"file_path": "scratch.txt", "new_content": ""}),
    )
    .await;
    assert!(!out.failed, "{}", out.status);
    assert_eq!(read(&ws, "scratch.txt"), "");
    assert_eq!(read(&ws, "scratch.txt.bak"), "junk");
}

// ── py2ipynb ─────────────────────────────────────────────────

#[tokio::test]
async fn py2ipynb_backs_up_existing_notebook() {
    let ws = workspace();
    std::fs::write(ws.path().join("a.py"), "x = 1\n").unwrap();
    std::fs::write(ws.path().join("a.ipynb"), "old notebook").unwrap();

    let out = call(&file_tools(&ws), "py2ipynb", json!({"file_path": "a.py"})).await;
    assert!(!out.failed, "{}", out.status);
    assert!(out.status.ends_with("(Original backed up)"));
    assert_eq!(read(&ws, "a.ipynb.bak"), "old notebook");
    assert_eq!(out.artifact.unwrap().backup, Some(BackupStatus::BackupCreated));
}

#[tokio::test]
async fn py2ipynb_splits_cells() {
    let ws = workspace();
    std::fs::write(ws.path().join("a.py"), "import os\n# %%\nprint(os.sep)\n").unwrap();
    let out = call(&file_tools(&ws), "py2ipynb", json!({"file_path": "a.py"})).await;
    assert!(!out.failed, "{}", out.status);
    let nb: Value = serde_json::from_str(&read(&ws, "a.ipynb")).unwrap();
    assert_eq!(nb["cells"].as_array().unwrap().len(), 2);
    assert_eq!(nb["cells"][0]["cell_type"], "code");
}

#[tokio::test]
async fn py2ipynb_output_must_stay_in_root() {
    let ws = workspace();
    std::fs::write(ws.path().join("a.py"), "x = 1\n").unwrap();
    let out = call(
        &file_tools(&ws),
        "py2ipynb",
        json!({"file_path": "a.py", "output": "../escape.ipynb"}),
    )
    .await;
    assert!(out.failed);
}

// ── format-code / r-script ───────────────────────────────────

#[tokio::test]
async fn format_code_missing_file() {
    let ws = workspace();
    let out = call(&file_tools(&ws), "format-code", json!({"file_path": "a.py"})).await;
    assert!(out.failed);
    assert!(out.status.starts_with("❌ File not found"));
}

#[tokio::test]
async fn r_script_requires_code() {
    let ws = workspace();
    let out = call(&file_tools(&ws), "r-script", json!({"code": "  "})).await;
    assert!(out.failed);
    assert!(out.status.contains("'code' cannot be empty."));
}

// ── generate-test ────────────────────────────────────────────

#[tokio::test]
async fn generate_test_uses_model_reply() {
    let ws = workspace();
    std::fs::write(ws.path().join("calc.py"), "def add(a, b):\n    return a + b\n").unwrap();
    let model = FixedReply::ok("```python\nfrom calc import *\n\ndef test_add():\n    assert add(1, 2) == 3\n```");
    let reg = all_tools(&ws, model.clone());

    let out = call(&reg, "generate-test", json!({"file_path": "calc.py"})).await;
    assert!(!out.failed, "{}", out.status);
    assert!(out.status.starts_with("✅ Generated test scaffold"));
    assert_eq!(
        read(&ws, "tests/test_calc.py"),
        "from calc import *\n\ndef test_add():\n    assert add(1, 2) == 3\n"
    );
    assert!(model.prompts()[0].contains("def add(a, b)"));

    let again = call(&reg, "generate-test", json!({"file_path": "calc.py"})).await;
    assert!(again.failed);
    assert_eq!(again.artifact.unwrap().status, FileStatus::Exists);
}

#[tokio::test]
async fn generate_test_falls_back_to_scaffold() {
    let ws = workspace();
    std::fs::write(ws.path().join("util.py"), "X = 1\n").unwrap();
    let reg = all_tools(&ws, FixedReply::failing("model offline"));

    let out = call(
        &reg,
        "generate-test",
        json!({"file_path": "util.py", "tests_dir": "qa"}),
    )
    .await;
    assert!(!out.failed, "{}", out.status);
    let body = read(&ws, "qa/test_util.py");
    assert!(body.contains("from util import *"));
    assert!(body.contains("def test_placeholder():"));
}

#[tokio::test]
async fn generate_test_missing_source() {
    let ws = workspace();
    let reg = all_tools(&ws, FixedReply::ok("x"));
    let out = call(&reg, "generate-test", json!({"file_path": "nope.py"})).await;
    assert!(out.failed);
    assert!(out.status.starts_with("❌ Source file not found"));
}

// ── search-explain / general-chat ────────────────────────────

#[tokio::test]
async fn search_explain_summarises_hits() {
    let ws = workspace();
    std::fs::write(ws.path().join("model.R"), "fit <- lm(y ~ x)\n").unwrap();
    let model = FixedReply::ok("A linear model fit.");
    let reg = all_tools(&ws, model.clone());

    let out = call(&reg, "search-explain", json!({"search_query": "LM\\("})).await;
    assert!(!out.failed, "{}", out.status);
    assert_eq!(out.status, "A linear model fit.");
    let artifact = out.artifact.unwrap();
    assert_eq!(artifact.status, FileStatus::Analysed);
    assert!(artifact.path.ends_with("model.R"));
    let prompt = &model.prompts()[0];
    assert!(prompt.starts_with("You are an expert code analyst."));
    assert!(prompt.contains("Snippet:\nfit <- lm(y ~ x) "));
}

#[tokio::test]
async fn search_explain_no_hits() {
    let ws = workspace();
    std::fs::write(ws.path().join("a.txt"), "alpha").unwrap();
    let model = FixedReply::ok("unused");
    let reg = all_tools(&ws, model.clone());
    let out = call(&reg, "search-explain", json!({"search_query": "omega"})).await;
    assert!(out.failed);
    assert_eq!(out.status, "❌ No matches found.");
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn general_chat_forwards_query() {
    let ws = workspace();
    let model = FixedReply::ok("Use a virtualenv.");
    let reg = all_tools(&ws, model.clone());
    let out = call(&reg, "general-chat", json!({"query": "how do I isolate deps?"})).await;
    assert_eq!(out.status, "Use a virtualenv.");
    assert!(model.prompts()[0].contains("User's query: \"how do I isolate deps?\""));

    let reg = all_tools(&ws, FixedReply::failing("timeout"));
    let out = call(&reg, "general-chat", json!({"query": "hi"})).await;
    assert!(out.failed);
    assert!(out.status.starts_with("❌ Error during general chat: timeout"));
}

// ── notebook ─────────────────────────────────────────────────

#[tokio::test]
async fn notebook_create_writes_nbformat4() {
    let ws = workspace();
    let reg = all_tools(&ws, FixedReply::ok("x"));
    let out = call(
        &reg,
        "notebook",
        json!({"file_path": "analysis.ipynb", "content": "# Analysis"}),
    )
    .await;
    assert!(!out.failed, "{}", out.status);
    let nb: Value = serde_json::from_str(&read(&ws, "analysis.ipynb")).unwrap();
    assert_eq!(nb["nbformat"], 4);
    assert_eq!(nb["cells"][0]["source"], "# Analysis");
}

#[tokio::test]
async fn notebook_overwrite_keeps_backup_of_user_cells() {
    let ws = workspace();
    let reg = all_tools(&ws, FixedReply::ok("x"));
    call(
        &reg,
        "notebook",
        json!({"file_path": "work.ipynb", "content": "my analysis"}),
    )
    .await;

    let out = call(
        &reg,
        "notebook",
        json!({"file_path": "work.ipynb", "content": "fresh start"}),
    )
    .await;
    assert!(!out.failed, "{}", out.status);
    assert!(out.status.ends_with("(Original backed up)"));
    assert_eq!(out.artifact.unwrap().backup, Some(BackupStatus::BackupCreated));

    let saved: Value = serde_json::from_str(&read(&ws, "work.ipynb.bak")).unwrap();
    assert_eq!(saved["cells"][0]["source"], "my analysis");
    let current: Value = serde_json::from_str(&read(&ws, "work.ipynb")).unwrap();
    assert_eq!(current["cells"][0]["source"], "fresh start");
}

#[tokio::test]
async fn notebook_create_reports_no_backup_for_new_path() {
    let ws = workspace();
    let reg = all_tools(&ws, FixedReply::ok("x"));
    let out = call(&reg, "notebook", json!({"file_path": "n.ipynb"})).await;
    assert_eq!(out.artifact.unwrap().backup, Some(BackupStatus::NoBackup));
    assert!(!ws.path().join("n.ipynb.bak").exists());
}
