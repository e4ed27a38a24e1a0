//! Retrying command execution with bounded timeouts and cleanup hooks.
//!
//! [`RetryExecutor`] is the single resilience wrapper every stage uses to run
//! external tools: bounded attempts, linear backoff, per-attempt timeout with
//! forcible process-group termination, and a caller-supplied cleanup hook run
//! between attempts to remove partial state before the next try. Captured
//! output is redacted before it can reach logs or error messages.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::error::{OrchestratorError, Result};
use crate::redact::Redactor;
use crate::resources::ResourcePreflight;

/// One external command invocation.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory; inherits the orchestrator's when `None`
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates a spec with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    /// Appends arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Adds an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Human-readable command line for diagnostics (unredacted).
    fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Retry policy: attempts, backoff, and per-attempt timeout.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum attempts; at least 1
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `base_delay * n` before retrying
    pub base_delay: Duration,
    /// Wall-clock bound per attempt
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Single attempt, no backoff, with the given timeout.
    pub fn once(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            attempt_timeout,
        }
    }
}

/// Captured output of a successful command.
#[derive(Clone, Debug)]
pub struct ExecOutput {
    /// Redacted stdout
    pub stdout: String,
    /// Redacted stderr
    pub stderr: String,
    /// Number of attempts made, including the successful one
    pub attempts: u32,
}

/// Outcome of one attempt, before retry policy is applied.
enum AttemptOutcome {
    Success { stdout: String, stderr: String },
    Failure { diagnostics: String },
    TimedOut { diagnostics: String },
}

/// Generic retrying executor; agnostic to what command it runs.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    redactor: Redactor,
    preflight: Option<ResourcePreflight>,
}

impl RetryExecutor {
    /// Creates an executor with the given policy and redactor.
    pub fn new(policy: RetryPolicy, redactor: Redactor) -> Self {
        Self {
            policy,
            redactor,
            preflight: None,
        }
    }

    /// Attaches a resource preflight that runs before every attempt.
    pub fn with_preflight(mut self, preflight: ResourcePreflight) -> Self {
        self.preflight = Some(preflight);
        self
    }

    /// Runs a command under the retry policy with no cleanup hook.
    pub async fn run(&self, spec: &CommandSpec) -> Result<ExecOutput> {
        self.run_with_cleanup(spec, |_attempt| async {}).await
    }

    /// Runs a command under the retry policy, invoking `cleanup` between a
    /// failed attempt and the next one (never after the last attempt).
    ///
    /// The cleanup hook receives the 1-based index of the attempt that just
    /// failed, and is the place to remove partial output, stale locks, or
    /// orphaned children before retrying.
    pub async fn run_with_cleanup<F, Fut>(&self, spec: &CommandSpec, cleanup: F) -> Result<ExecOutput>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = ()>,
    {
        let command_display = self.redactor.redact(&spec.display());
        let mut last_failure: Option<AttemptOutcome> = None;

        for attempt in 1..=self.policy.max_attempts {
            // Starved disk or memory turns into opaque timeouts otherwise.
            if let Some(preflight) = &self.preflight {
                preflight.check()?;
            }
            log::debug!(
                "running `{}` (attempt {}/{})",
                command_display,
                attempt,
                self.policy.max_attempts
            );

            match self.attempt(spec).await? {
                AttemptOutcome::Success { stdout, stderr } => {
                    return Ok(ExecOutput {
                        stdout,
                        stderr,
                        attempts: attempt,
                    });
                }
                outcome => {
                    match &outcome {
                        AttemptOutcome::TimedOut { .. } => log::warn!(
                            "`{}` exceeded {}s timeout on attempt {}",
                            command_display,
                            self.policy.attempt_timeout.as_secs(),
                            attempt
                        ),
                        AttemptOutcome::Failure { diagnostics } => log::warn!(
                            "`{}` failed on attempt {}: {}",
                            command_display,
                            attempt,
                            diagnostics.lines().last().unwrap_or("")
                        ),
                        AttemptOutcome::Success { .. } => unreachable!(),
                    }
                    last_failure = Some(outcome);
                }
            }

            if attempt < self.policy.max_attempts {
                cleanup(attempt).await;
                let delay = self.policy.base_delay * attempt;
                if !delay.is_zero() {
                    log::debug!("retrying in {}s", delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            }
        }

        match last_failure {
            Some(AttemptOutcome::TimedOut { diagnostics }) => {
                Err(OrchestratorError::ExecutionTimeout {
                    command: command_display,
                    timeout_secs: self.policy.attempt_timeout.as_secs(),
                    attempts: self.policy.max_attempts,
                    diagnostics,
                })
            }
            Some(AttemptOutcome::Failure { diagnostics }) => {
                Err(OrchestratorError::ExecutionFailed {
                    command: command_display,
                    attempts: self.policy.max_attempts,
                    diagnostics,
                })
            }
            // max_attempts >= 1 guarantees at least one recorded outcome
            _ => Err(OrchestratorError::ExecutionFailed {
                command: command_display,
                attempts: self.policy.max_attempts,
                diagnostics: "no attempt was made".into(),
            }),
        }
    }

    /// Runs one attempt, enforcing the per-attempt timeout.
    async fn attempt(&self, spec: &CommandSpec) -> Result<AttemptOutcome> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.envs {
            command.env(key, value);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                // Spawn failure (missing binary, permissions) is an attempt
                // failure like any other; retries may see the tool appear.
                return Ok(AttemptOutcome::Failure {
                    diagnostics: self
                        .redactor
                        .redact(&format!("failed to spawn {}: {e}", spec.program)),
                });
            }
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match tokio::time::timeout(self.policy.attempt_timeout, child.wait()).await {
            Ok(waited) => Some(waited?),
            Err(_elapsed) => {
                terminate_process_tree(&mut child).await;
                None
            }
        };

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let stdout = self.redactor.redact(&String::from_utf8_lossy(&stdout_bytes));
        let stderr = self.redactor.redact(&String::from_utf8_lossy(&stderr_bytes));

        match status {
            None => Ok(AttemptOutcome::TimedOut {
                diagnostics: format_diagnostics("killed at timeout", &stdout, &stderr),
            }),
            Some(status) if status.success() => Ok(AttemptOutcome::Success { stdout, stderr }),
            Some(status) => {
                let header = match status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                };
                Ok(AttemptOutcome::Failure {
                    diagnostics: format_diagnostics(&header, &stdout, &stderr),
                })
            }
        }
    }
}

/// Forcibly terminates the child and everything in its process group.
///
/// The logical wait has already been abandoned; build tools fork helpers, so
/// killing only the direct child would leave orphans holding output locks.
async fn terminate_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }

    let _ = child.kill().await;
    let _ = child.wait().await;
}

/// Combines the attempt's fate and captured streams into one diagnostic
/// block.
fn format_diagnostics(header: &str, stdout: &str, stderr: &str) -> String {
    let mut out = header.to_string();
    if !stderr.trim().is_empty() {
        out.push_str("\nstderr:\n");
        out.push_str(stderr.trim_end());
    }
    if !stdout.trim().is_empty() {
        out.push_str("\nstdout:\n");
        out.push_str(stdout.trim_end());
    }
    out
}
