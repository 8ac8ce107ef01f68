//! Subprocess helper for tools that shell out to formatters and
//! interpreters.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

use super::truncate_utf8_owned;

/// Captured output is capped at this many bytes per stream.
const MAX_OUTPUT: usize = 64 * 1024;

/// Result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// True when `program` resolves on `PATH`.
pub fn on_path(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run `program` with `args` in `cwd`, killing it after `timeout`.
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> anyhow::Result<ProcessOutput> {
    debug!(program, ?args, cwd = %cwd.display(), "spawning subprocess");
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start `{program}`"))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(res) => res.with_context(|| format!("`{program}` did not complete"))?,
        Err(_) => anyhow::bail!("`{program}` timed out after {}s", timeout.as_secs()),
    };

    Ok(ProcessOutput {
        exit_code: output.status.code(),
        stdout: truncate_utf8_owned(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
            MAX_OUTPUT,
        ),
        stderr: truncate_utf8_owned(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
            MAX_OUTPUT,
        ),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let out = run(
            "sh",
            &["-c", "echo hi; echo oops >&2; exit 3"],
            dir.path(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout, "hi");
        assert_eq!(out.stderr, "oops");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn times_out() {
        let dir = tempfile::tempdir().unwrap();
        let err = run("sh", &["-c", "sleep 5"], dir.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run("definitely-not-a-real-binary-xyz", &[], dir.path(), Duration::from_secs(1))
            .await
            .is_err());
        assert!(!on_path("definitely-not-a-real-binary-xyz"));
    }
}
