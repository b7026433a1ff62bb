//! Subprocess execution with output capture.
//!
//! Process failure is data, not control flow: a launch failure (missing
//! binary, permission denied) resolves to a [`ProcessOutput`] carrying
//! [`LAUNCH_FAILURE_EXIT_CODE`] with the error text folded into `stderr`.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use lintel_utils::format_command_for_log;
use tokio::process::Command;

/// Exit code reported when the process could not be launched at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// Exit code reported when the process was terminated by a signal.
pub const TERMINATED_EXIT_CODE: i32 = -2;

/// A fully-built command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl CommandSpec {
    /// Command line with sensitive option values masked.
    #[must_use]
    pub fn display_for_log(&self) -> String {
        format_command_for_log(&self.program, &self.args)
    }
}

/// Captured result of one process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Output for a process that never started.
    #[must_use]
    pub fn launch_failure(spec: &CommandSpec, err: &io::Error) -> Self {
        Self::new(
            LAUNCH_FAILURE_EXIT_CODE,
            String::new(),
            format!("failed to launch {}: {err}", spec.program),
        )
    }

    #[must_use]
    pub fn launch_failed(&self) -> bool {
        self.exit_code == LAUNCH_FAILURE_EXIT_CODE
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs external processes to completion.
///
/// Implementations never fail: every outcome is expressed as a [`ProcessOutput`].
pub trait ProcessRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> impl Future<Output = ProcessOutput> + Send;
}

/// [`ProcessRunner`] backed by `tokio::process`.
///
/// Children get an empty stdin and are killed if the run future is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> ProcessOutput {
        tracing::debug!(
            command = %spec.display_for_log(),
            cwd = %spec.cwd.display(),
            "Running external process"
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match cmd.spawn() {
            Ok(child) => child.wait_with_output().await,
            Err(e) => Err(e),
        };

        match output {
            Ok(output) => {
                let exit_code = output.status.code().unwrap_or(TERMINATED_EXIT_CODE);
                tracing::debug!(exit_code, "External process finished");
                ProcessOutput::new(
                    exit_code,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr),
                )
            }
            Err(e) => {
                tracing::warn!(
                    command = %spec.display_for_log(),
                    "Failed to run external process: {e}"
                );
                ProcessOutput::launch_failure(spec, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn spec(program: &str, args: &[&str]) -> CommandSpec {
        CommandSpec {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            cwd: env::temp_dir(),
        }
    }

    #[test]
    fn launch_failure_carries_sentinel_and_message() {
        let s = spec("phpstan", &[]);
        let err = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let out = ProcessOutput::launch_failure(&s, &err);
        assert!(out.launch_failed());
        assert!(!out.succeeded());
        assert!(out.stdout.is_empty());
        assert!(out.stderr.contains("failed to launch phpstan"));
        assert!(out.stderr.contains("No such file or directory"));
    }

    #[test]
    fn display_for_log_is_redacted() {
        let s = spec("phpstan", &["analyse", "--token=abc"]);
        assert_eq!(s.display_for_log(), "phpstan analyse --token=***");
    }

    #[tokio::test]
    async fn missing_binary_resolves_as_data() {
        let out = TokioProcessRunner
            .run(&spec("/definitely/not/a/real/binary-lintel", &["--version"]))
            .await;
        assert_eq!(out.exit_code, LAUNCH_FAILURE_EXIT_CODE);
        assert!(!out.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_stderr_and_exit_code() {
        let out = TokioProcessRunner
            .run(&spec("sh", &["-c", "echo out; echo err >&2; exit 3"]))
            .await;
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.launch_failed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdin_is_empty() {
        let out = TokioProcessRunner.run(&spec("cat", &[])).await;
        assert!(out.succeeded());
        assert!(out.stdout.is_empty());
    }
}
