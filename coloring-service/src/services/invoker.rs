//! Runs the external generation script and normalizes every outcome into an
//! [`InvocationResult`].

use crate::config::InvokerConfig;
use crate::services::metrics;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Normalized result of one generation attempt.
///
/// `return_code` is 0 only when the script ran and exited successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    pub message: String,
    pub error: String,
    pub return_code: i32,
}

impl InvocationResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            error: error.into(),
            return_code: 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == 0
    }
}

/// How an invocation ended, used for logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    ScriptError,
    MissingCredential,
    MissingScript,
    TimedOut,
    Cancelled,
    LaunchError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ScriptError => "script_error",
            Outcome::MissingCredential => "missing_credential",
            Outcome::MissingScript => "missing_script",
            Outcome::TimedOut => "timeout",
            Outcome::Cancelled => "cancelled",
            Outcome::LaunchError => "launch_error",
        }
    }
}

enum Waited {
    Finished(std::io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Invoker {
    script_path: PathBuf,
    shell: String,
    credential_var: String,
    timeout: Duration,
}

impl Invoker {
    pub fn new(config: &InvokerConfig) -> Self {
        Self {
            script_path: config.resolved_script_path(),
            shell: config.shell.clone(),
            credential_var: config.credential_var.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn credential_var(&self) -> &str {
        &self.credential_var
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the script once for `idea`. Never fails: preconditions, launch
    /// errors, timeouts and cancellation all come back as a result with a
    /// nonzero `return_code`.
    pub async fn invoke(&self, idea: &str, cancel: &CancellationToken) -> InvocationResult {
        let start = Instant::now();
        let (outcome, result) = self.run(idea, cancel).await;
        let elapsed = start.elapsed();

        metrics::record_invocation(outcome, elapsed);

        if outcome == Outcome::Success {
            tracing::info!(
                idea = %idea,
                return_code = result.return_code,
                duration_ms = elapsed.as_millis() as u64,
                "Coloring page generated"
            );
        } else {
            tracing::warn!(
                idea = %idea,
                outcome = outcome.as_str(),
                return_code = result.return_code,
                error = %result.error,
                duration_ms = elapsed.as_millis() as u64,
                "Coloring page generation failed"
            );
        }

        result
    }

    async fn run(&self, idea: &str, cancel: &CancellationToken) -> (Outcome, InvocationResult) {
        if !credential_present(&self.credential_var) {
            return (
                Outcome::MissingCredential,
                InvocationResult::failure(format!(
                    "{} environment variable is not set",
                    self.credential_var
                )),
            );
        }

        if !tokio::fs::try_exists(&self.script_path)
            .await
            .unwrap_or(false)
        {
            return (
                Outcome::MissingScript,
                InvocationResult::failure(format!(
                    "Coloring script not found at {}. Please update the script_path in the server.",
                    self.script_path.display()
                )),
            );
        }

        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.script_path)
            .arg(idea)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(
            shell = %self.shell,
            script = %self.script_path.display(),
            idea = %idea,
            timeout_secs = self.timeout.as_secs(),
            "Executing coloring script"
        );

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return (
                    Outcome::LaunchError,
                    InvocationResult::failure(format!("Error executing script: {}", e)),
                );
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let waited = {
            let collect = async {
                tokio::try_join!(child.wait(), read_stream(stdout), read_stream(stderr))
            };

            tokio::select! {
                res = collect => Waited::Finished(res),
                _ = tokio::time::sleep(self.timeout) => Waited::TimedOut,
                _ = cancel.cancelled() => Waited::Cancelled,
            }
        };

        match waited {
            Waited::Finished(Ok((status, stdout, stderr))) => {
                if !stdout.is_empty() {
                    tracing::debug!(
                        stdout = %String::from_utf8_lossy(&stdout).trim(),
                        "Coloring script output"
                    );
                }
                finished(idea, status, &stderr)
            }
            Waited::Finished(Err(e)) => {
                terminate(&mut child).await;
                (
                    Outcome::LaunchError,
                    InvocationResult::failure(format!("Error executing script: {}", e)),
                )
            }
            Waited::TimedOut => {
                terminate(&mut child).await;
                (
                    Outcome::TimedOut,
                    InvocationResult::failure(timeout_message(self.timeout)),
                )
            }
            Waited::Cancelled => {
                terminate(&mut child).await;
                (
                    Outcome::Cancelled,
                    InvocationResult::failure("Script execution cancelled"),
                )
            }
        }
    }
}

fn credential_present(var: &str) -> bool {
    std::env::var_os(var).is_some_and(|value| !value.is_empty())
}

fn timeout_message(timeout: Duration) -> String {
    format!("Script execution timed out ({} seconds)", timeout.as_secs())
}

fn finished(idea: &str, status: ExitStatus, stderr: &[u8]) -> (Outcome, InvocationResult) {
    let return_code = exit_code(status);
    let error = String::from_utf8_lossy(stderr).trim().to_string();

    if return_code == 0 {
        (
            Outcome::Success,
            InvocationResult {
                message: format!(
                    "Coloring page for '{}' has been generated and sent to printer!",
                    idea
                ),
                error,
                return_code,
            },
        )
    } else {
        (
            Outcome::ScriptError,
            InvocationResult {
                message: format!("Script executed but returned error code {}", return_code),
                error,
                return_code,
            },
        )
    }
}

/// Exit code, or the negated signal number for a signal death.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    -1
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Kill the script together with anything it spawned, then reap it.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        kill_process_group(pid);
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Coloring script already exited");
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The child leads its own group (process_group(0)), so its pid is the pgid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "Failed to signal script process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
