//! File-system helpers shared by the tools and the CLI: atomic writes,
//! sibling backups, diff previews and notebook conversion.

pub mod notebook;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, warn};

// ── Atomic write ─────────────────────────────────────────────

/// Write `contents` to `path` atomically.
///
/// The data goes to a temporary file in the target's directory, is
/// synced, and is then renamed over the target.  Missing parent
/// directories are created.
pub async fn atomic_write(path: &Path, contents: impl Into<Vec<u8>>) -> anyhow::Result<()> {
    let path = path.to_path_buf();
    let bytes = contents.into();
    tokio::task::spawn_blocking(move || atomic_write_with(&path, |f| f.write_all(&bytes)))
        .await
        .context("atomic write task panicked")?
}

/// Synchronous core of [`atomic_write`] with a caller-supplied writer.
///
/// If `write` fails, the temporary file is removed and the target is left
/// exactly as it was.
pub fn atomic_write_with<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut std::fs::File) -> std::io::Result<()>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)
        .with_context(|| format!("create directory {}", parent.display()))?;

    // Temp files start out 0600; keep the target's mode, or give a new
    // file the usual umask-filtered default.
    let existing = std::fs::metadata(path).ok().map(|m| m.permissions());
    let mut builder = tempfile::Builder::new();
    builder.prefix(".code-agent-").suffix(".tmp");
    if existing.is_none() {
        default_mode(&mut builder);
    }
    let mut tmp = builder
        .tempfile_in(&parent)
        .with_context(|| format!("create temp file in {}", parent.display()))?;
    if let Some(perms) = existing {
        tmp.as_file()
            .set_permissions(perms)
            .with_context(|| format!("copy permissions of {}", path.display()))?;
    }

    write(tmp.as_file_mut()).with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("sync temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("rename temp file onto {}", path.display()))?;

    debug!(path = %path.display(), "atomic write complete");
    Ok(())
}

#[cfg(unix)]
fn default_mode(builder: &mut tempfile::Builder<'_, '_>) {
    use std::os::unix::fs::PermissionsExt;
    builder.permissions(std::fs::Permissions::from_mode(0o666));
}

#[cfg(not(unix))]
fn default_mode(_builder: &mut tempfile::Builder<'_, '_>) {}

// ── Backups ──────────────────────────────────────────────────

/// Outcome of the pre-write backup step.  Reported separately from the
/// write itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// Target did not exist; nothing to back up.
    NoBackup,
    BackupCreated,
    BackupFailed,
}

impl BackupStatus {
    /// Suffix appended to a tool's success message.
    pub fn note(&self) -> &'static str {
        match self {
            BackupStatus::NoBackup => "",
            BackupStatus::BackupCreated => " (Original backed up)",
            BackupStatus::BackupFailed => " (⚠️ Backup failed!)",
        }
    }
}

/// Sibling backup path: `notes.md` → `notes.md.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to its `.bak` sibling.  Best effort: failures are logged and
/// reported through the return value, never as an error.
pub async fn backup_file(path: &Path) -> BackupStatus {
    if !path.is_file() {
        return BackupStatus::NoBackup;
    }
    let bak = backup_path(path);
    match tokio::fs::copy(path, &bak).await {
        Ok(_) => {
            debug!(src = %path.display(), dst = %bak.display(), "created backup");
            BackupStatus::BackupCreated
        }
        Err(e) => {
            warn!(src = %path.display(), error = %e, "backup failed");
            BackupStatus::BackupFailed
        }
    }
}

// ── Diffs ────────────────────────────────────────────────────

/// Unified diff between two texts, labelled `a/<label>` and `b/<label>`.
/// Empty when the texts are identical.
pub fn unified_diff(old: &str, new: &str, label: &str) -> String {
    if old == new {
        return String::new();
    }
    similar::TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}
