use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Outcome of one execution attempt.
#[derive(Debug)]
pub struct ExecutionResult {
    pub success: bool,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Executes job commands through the shell, bounded by a per-attempt
/// timeout.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `sh -c <command>` and report the outcome. A child that outlives
    /// the timeout is killed.
    pub async fn execute(&self, job_id: &str, command: &str) -> ExecutionResult {
        tracing::info!(job_id = %job_id, command, "Executing job");

        // Only stderr feeds error_message; child stdout is discarded.
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let result = match tokio::time::timeout(self.timeout, output).await {
            Err(_) => {
                tracing::warn!(job_id = %job_id, timeout_secs = self.timeout.as_secs(), "Job timed out");
                return ExecutionResult::failed(format!(
                    "Command timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
            Ok(result) => result,
        };

        match result {
            Ok(output) if output.status.success() => {
                tracing::info!(job_id = %job_id, "Job succeeded");
                ExecutionResult::ok()
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let error = if stderr.trim().is_empty() {
                    match output.status.code() {
                        Some(code) => format!("Exit code: {code}"),
                        None => "Terminated by signal".to_string(),
                    }
                } else {
                    stderr.trim_end().to_string()
                };
                tracing::info!(
                    job_id = %job_id,
                    exit_code = ?output.status.code(),
                    "Job failed"
                );
                ExecutionResult::failed(error)
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "Failed to spawn job command");
                ExecutionResult::failed(err.to_string())
            }
        }
    }
}
