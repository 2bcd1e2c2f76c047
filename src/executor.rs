//! Process execution for shell-driven backends.
//!
//! Kubernetes and cloud adapters talk to their backends through CLI tools
//! (`kubectl`, `az`). All process spawning goes through [`ProcessRunner`] so
//! adapters can be exercised without real binaries.
//!
//! Output handling is the same everywhere: standard output followed by
//! standard error in one buffer, and a non-zero exit becomes an
//! `ExecutionError` carrying that buffer verbatim.

use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ParleyError, Result};

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Trait for running system processes.
///
/// This abstraction enables testing without spawning real processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs a program with arguments and captures its output.
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<Output>;

    /// Runs a command line through the platform shell.
    async fn run_shell(&self, command: &str) -> std::io::Result<Output> {
        let (shell, flag) = shell_invocation();
        self.run(shell, &[flag.to_string(), command.to_string()]).await
    }
}

/// Shell and flag used to run a command line (`sh -c`, or `cmd /C` on Windows)
#[must_use]
pub const fn shell_invocation() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

// =============================================================================
// Default Implementation
// =============================================================================

/// Default process runner using `tokio::process::Command`.
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> std::io::Result<Output> {
        debug!(program, ?args, "Spawning process");
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
    }
}

// =============================================================================
// Output Handling
// =============================================================================

/// Standard output followed by standard error
#[must_use]
pub fn combined_output(output: &Output) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(output.stdout.len() + output.stderr.len());
    buffer.extend_from_slice(&output.stdout);
    buffer.extend_from_slice(&output.stderr);
    buffer
}

/// Short description of why a process failed, for auth and context errors
#[must_use]
pub fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        match output.status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        stderr.to_string()
    }
}

/// Run a confirmed command line through the shell
///
/// Returns the combined output on success. A spawn failure or non-zero exit
/// is an `ExecutionError`; for the latter the message is the output verbatim.
pub async fn execute_shell(runner: &dyn ProcessRunner, command: &str) -> Result<Vec<u8>> {
    info!(command, "Executing shell command");

    let output = runner
        .run_shell(command)
        .await
        .map_err(|e| ParleyError::execution(format!("Could not start shell: {e}")))?;

    let buffer = combined_output(&output);
    if output.status.success() {
        Ok(buffer)
    } else {
        info!(status = ?output.status.code(), "Shell command failed");
        Err(ParleyError::execution(String::from_utf8_lossy(&buffer).into_owned()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::sync::Mutex;

    /// Records invocations and returns a canned output.
    struct MockProcessRunner {
        code: i32,
        stdout: &'static str,
        stderr: &'static str,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl MockProcessRunner {
        fn new(code: i32, stdout: &'static str, stderr: &'static str) -> Self {
            Self { code, stdout, stderr, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ProcessRunner for MockProcessRunner {
        async fn run(&self, program: &str, args: &[String]) -> std::io::Result<Output> {
            self.calls.lock().unwrap().push((program.to_string(), args.to_vec()));
            Ok(Output {
                status: ExitStatus::from_raw(self.code << 8),
                stdout: self.stdout.as_bytes().to_vec(),
                stderr: self.stderr.as_bytes().to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_shell_command_goes_through_sh() {
        let runner = MockProcessRunner::new(0, "NAME\nweb\n", "");
        let out = execute_shell(&runner, "kubectl get pods | head").await.unwrap();

        assert_eq!(out, b"NAME\nweb\n");
        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "sh");
        assert_eq!(calls[0].1, vec!["-c".to_string(), "kubectl get pods | head".to_string()]);
    }

    #[tokio::test]
    async fn test_stdout_then_stderr() {
        let runner = MockProcessRunner::new(0, "out\n", "warn\n");
        assert_eq!(execute_shell(&runner, "x").await.unwrap(), b"out\nwarn\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_output_verbatim() {
        let runner = MockProcessRunner::new(1, "", "Error from server (NotFound): pods \"x\" not found\n");
        let err = execute_shell(&runner, "kubectl get pod x").await.unwrap_err();

        assert!(matches!(err, ParleyError::Execution(_)));
        assert_eq!(
            err.to_string(),
            "Execution failed: Error from server (NotFound): pods \"x\" not found\n"
        );
    }

    #[tokio::test]
    async fn test_real_shell_round_trip() {
        let err = execute_shell(&SystemProcessRunner, "echo out; echo err 1>&2; exit 3")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Execution failed: out\nerr\n");
    }

    #[test]
    fn test_failure_reason() {
        let output = Output { status: ExitStatus::from_raw(2 << 8), stdout: Vec::new(), stderr: Vec::new() };
        assert_eq!(failure_reason(&output), "exited with status 2");

        let output = Output {
            status: ExitStatus::from_raw(1 << 8),
            stdout: Vec::new(),
            stderr: b"  Please run 'az login'\n".to_vec(),
        };
        assert_eq!(failure_reason(&output), "Please run 'az login'");
    }
}
