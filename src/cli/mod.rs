//! Subcommand handlers extracted from `main.rs`.
//!
//! Keeps `main.rs` slim: clap parsing stays there, the work lives here.

use std::path::Path;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{TurnOptions, TurnOutcome};
use crate::config::Config;
use crate::files::{atomic_write, backup_file, notebook, BackupStatus};
use crate::models::{self, ModelBinding};
use crate::session::StateStore;
use crate::shell::{self, Session};
use crate::tools::ToolRegistry;

// ── Session assembly ─────────────────────────────────────────────────────────

/// System message prepended to every model request.
pub fn system_prompt(root: &Path) -> String {
    format!(
        "You are a local developer assistant working inside the directory {}. \
         Use the available tools to read, create, edit, format and search files there; \
         all file paths are relative to that directory. Call tools only when they help \
         answer the request, and reply with plain text once you have the answer.",
        root.display()
    )
}

/// Canonicalise the configured root, build the provider, registry and
/// binding.  Fails only when the root is unusable or the provider
/// configuration cannot be turned into a client.
pub fn build_session(cfg: &Config) -> anyhow::Result<Session> {
    let root = cfg
        .root_dir
        .canonicalize()
        .with_context(|| format!("root directory {} is not accessible", cfg.root_dir.display()))?;
    if !root.is_dir() {
        anyhow::bail!("root directory {} is not a directory", root.display());
    }

    let provider = models::build_provider(&cfg.model).context("failed to set up model backend")?;
    let registry = ToolRegistry::build(&root, provider.clone());
    let binding = match provider {
        Some(p) => ModelBinding::bind(p, &registry.descriptors())
            .with_system_prompt(system_prompt(&root)),
        None => ModelBinding::unavailable("no model provider configured"),
    };
    info!(
        root = %root.display(),
        model = %binding.describe(),
        tools = registry.len(),
        "session assembled"
    );

    Ok(Session::new(
        root,
        registry,
        binding,
        TurnOptions {
            max_tool_rounds: cfg.max_tool_rounds,
        },
    ))
}

// ── Chat / run ───────────────────────────────────────────────────────────────

/// Interactive chat with optional persisted history.
pub async fn chat(cfg: &Config) -> anyhow::Result<()> {
    let mut session = build_session(cfg)?;
    if cfg.persist_state {
        session = session.with_store(StateStore::new(cfg.state_path()));
        if let Some(warning) = session.restore().await {
            eprintln!("{warning}");
        }
    }
    shell::run_repl(&mut session).await
}

/// One non-interactive turn.  Nothing is persisted.
pub async fn run_once(cfg: &Config, message: &str) -> anyhow::Result<()> {
    let mut session = build_session(cfg)?;
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let report = session.turn(message, &cancel).await;
    watcher.abort();
    debug!(
        model_calls = report.model_calls,
        tool_calls = report.tool_calls.len(),
        outcome = ?report.outcome,
        "run finished"
    );

    println!("{}", shell::render_report(&report));
    match report.outcome {
        TurnOutcome::Completed => Ok(()),
        TurnOutcome::MaxRoundsExceeded => anyhow::bail!("tool round limit reached"),
        TurnOutcome::Interrupted => anyhow::bail!("interrupted"),
    }
}

/// Print the registry without starting a session.
pub fn list_tools(cfg: &Config) -> anyhow::Result<()> {
    let session = build_session(cfg)?;
    println!("{}", session.tools_listing());
    Ok(())
}

// ── File helpers ─────────────────────────────────────────────────────────────

/// Create `path` with `content`.  Refuses to replace an existing file
/// unless `overwrite` is set, in which case a `.bak` copy is made first.
pub async fn create_file(path: &Path, content: &str, overwrite: bool) -> anyhow::Result<()> {
    if path.exists() {
        if !overwrite {
            anyhow::bail!(
                "File '{}' already exists. Use --overwrite to replace.",
                path.display()
            );
        }
        if backup_file(path).await == BackupStatus::BackupFailed {
            warn!(path = %path.display(), "continuing without backup");
        }
    }
    atomic_write(path, content).await?;
    println!("File written: {}", path.display());
    Ok(())
}

/// Append `content` to an existing file.
pub async fn append_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if !path.is_file() {
        anyhow::bail!("File '{}' does not exist.", path.display());
    }
    let mut text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    text.push_str(content);
    atomic_write(path, text).await?;
    println!("Appended to: {}", path.display());
    Ok(())
}

/// Convert `src` to a notebook, backing up an existing target first.
pub async fn convert_notebook(src: &Path, dst: Option<&Path>) -> anyhow::Result<()> {
    let target = dst
        .map(Path::to_path_buf)
        .unwrap_or_else(|| src.with_extension("ipynb"));
    if src.is_file() && backup_file(&target).await == BackupStatus::BackupFailed {
        warn!(path = %target.display(), "continuing without backup");
    }
    let written = notebook::py_to_ipynb(src, Some(&target)).await?;
    println!("Notebook written: {}", written.display());
    Ok(())
}

/// Write the default configuration to `path` unless a file is already
/// there.
pub async fn init_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("config file {} already exists", path.display());
    }
    Config::default().save(path).await?;
    println!("Config written: {}", path.display());
    Ok(())
}
