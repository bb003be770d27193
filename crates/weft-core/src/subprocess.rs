//! Subprocess adapter contract (§6): working directory, argument list,
//! optional stdin, and a timeout in; exit code, stdout and stderr out.
//! Spawn/cancel shape grounded on `tandem-tools::BashTool::execute_with_cancel`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SubprocessOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("failed to spawn subprocess: {0}")]
    Spawn(String),
    #[error("subprocess timed out after {0:?}")]
    Timeout(Duration),
    #[error("subprocess cancelled")]
    Cancelled,
}

pub struct SubprocessAdapter;

impl SubprocessAdapter {
    /// Stderr is captured but the caller should only surface it to the user
    /// when `exit_code != 0`, per the §6 contract.
    pub async fn run(
        program: &str,
        args: &[String],
        cwd: &Path,
        stdin: Option<&str>,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<SubprocessOutcome, SubprocessError> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| SubprocessError::Spawn(e.to_string()))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                let _ = pipe.write_all(input.as_bytes()).await;
            }
        }

        let wait = async {
            tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| SubprocessError::Timeout(timeout))
        };

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(SubprocessError::Cancelled),
            result = wait => result?.map_err(|e| SubprocessError::Spawn(e.to_string()))?,
        };

        Ok(SubprocessOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
