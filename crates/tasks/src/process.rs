//! The dispatch shapes for how one attempt of a task is actually run.
//!
//! `ProcessAttempt` is the seam between the retry loop in [`crate::runner`]
//! and the mechanics of running one attempt. The production implementation
//! ([`ChildProcessAttempt`]) spawns a real child process; [`crate::testsupport`]
//! provides a scripted stand-in so the retry loop itself can be exercised
//! without a real subprocess.

use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use store::repository::task_executions::try_update_state;
use store::Store;

use crate::error::TaskError;

/// What one dispatch attempt produced.
pub struct AttemptResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runs one attempt of a task step and reports its outcome.
///
/// Implementations own the live-progress channel: they are responsible for
/// echoing stdout and extracting `STATE:` lines as they stream, since
/// that's inseparable from *how* the attempt is driven.
#[async_trait]
pub trait ProcessAttempt: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        store: &dyn Store,
        execution_id: Uuid,
        step_name: &str,
        runtime_path: &str,
        runtime: &str,
        script_path: &Path,
        input_file: &Path,
        output_file: &Path,
    ) -> Result<AttemptResult, TaskError>;
}

/// Runtimes that use the wrapper (splat-binding) protocol instead of direct
/// invocation.
fn is_powershell_family(runtime: &str) -> bool {
    matches!(runtime, "pwsh" | "powershell")
}

fn state_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^STATE:\s*(.+)$").expect("static pattern is valid"))
}

/// Spawns a real child process for the task script.
pub struct ChildProcessAttempt;

#[async_trait]
impl ProcessAttempt for ChildProcessAttempt {
    async fn run(
        &self,
        store: &dyn Store,
        execution_id: Uuid,
        step_name: &str,
        runtime_path: &str,
        runtime: &str,
        script_path: &Path,
        input_file: &Path,
        output_file: &Path,
    ) -> Result<AttemptResult, TaskError> {
        let mut cmd = Command::new(runtime_path);
        if is_powershell_family(runtime) {
            // Wrapper contract: named arguments, splat-bound onto the
            // script's parameters from the input JSON.
            cmd.arg("-ScriptPath")
                .arg(script_path)
                .arg("-InputFile")
                .arg(input_file)
                .arg("-OutputFile")
                .arg(output_file);
        } else {
            cmd.arg(script_path)
                .arg("-InputFile")
                .arg(input_file)
                .arg("-OutputFile")
                .arg(output_file);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| TaskError::SpawnFailure {
            step: step_name.to_string(),
            source,
        })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_capture = output_file.with_extension("stdout.log");
        let stderr_capture = output_file.with_extension("stderr.log");

        // Drain both pipes concurrently so neither backs up and stalls the
        // child; `join!` needs no `'static` bound, unlike `tokio::spawn`,
        // so `store` can be borrowed here.
        let (stdout_result, stderr_result) = tokio::join!(
            capture_stdout(store, stdout, &stdout_capture, execution_id, step_name),
            capture_plain(stderr, &stderr_capture),
        );
        let stdout_content = stdout_result?;
        let stderr_content = stderr_result.map_err(|source| TaskError::Io {
            step: step_name.to_string(),
            source,
        })?;

        let status = child.wait().await.map_err(|source| TaskError::SpawnFailure {
            step: step_name.to_string(),
            source,
        })?;

        let _ = tokio::fs::remove_file(&stdout_capture).await;
        let _ = tokio::fs::remove_file(&stderr_capture).await;

        Ok(AttemptResult {
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout_content,
            stderr: stderr_content,
        })
    }
}

async fn capture_stdout(
    store: &dyn Store,
    reader: impl tokio::io::AsyncRead + Unpin,
    capture_path: &Path,
    execution_id: Uuid,
    step_name: &str,
) -> Result<String, TaskError> {
    let mut file = tokio::fs::File::create(capture_path)
        .await
        .map_err(|source| TaskError::Io {
            step: step_name.to_string(),
            source,
        })?;
    let mut lines = BufReader::new(reader).lines();
    let mut content = String::new();
    let pattern = state_line_pattern();

    while let Some(line) = lines.next_line().await.map_err(|source| TaskError::Io {
        step: step_name.to_string(),
        source,
    })? {
        println!("{line}");
        content.push_str(&line);
        content.push('\n');
        let _ = file.write_all(line.as_bytes()).await;
        let _ = file.write_all(b"\n").await;

        if let Some(captures) = pattern.captures(&line) {
            let state = captures.get(1).map(|m| m.as_str()).unwrap_or("").to_string();
            try_update_state(store, execution_id, step_name, &state).await;
        }
    }

    Ok(content)
}

async fn capture_plain(reader: impl tokio::io::AsyncRead + Unpin, capture_path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::create(capture_path).await?;
    let mut lines = BufReader::new(reader).lines();
    let mut content = String::new();
    while let Some(line) = lines.next_line().await? {
        content.push_str(&line);
        content.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_line_pattern_matches_prefixed_lines() {
        let pattern = state_line_pattern();
        let caps = pattern.captures("STATE: halfway there").unwrap();
        assert_eq!(&caps[1], "halfway there");
    }

    #[test]
    fn state_line_pattern_rejects_plain_lines() {
        assert!(state_line_pattern().captures("just a log line").is_none());
    }

    #[test]
    fn is_powershell_family_covers_both_spellings() {
        assert!(is_powershell_family("pwsh"));
        assert!(is_powershell_family("powershell"));
        assert!(!is_powershell_family("python"));
    }
}
