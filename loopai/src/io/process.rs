//! Helpers for running child processes with timeouts and bounded output.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::fault::Fault;
use crate::core::types::ExecOutcome;

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// How long to keep collecting output once the process group was killed.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run `command` through `sh -c` and fold every result into an [`ExecOutcome`].
///
/// Never fails: spawn errors and timeouts become failed outcomes with a
/// synthesized error. Elapsed time covers every branch.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_shell(command: &str, timeout: Duration, output_limit_bytes: usize) -> ExecOutcome {
    let started = Instant::now();
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);

    let output = match run_command_with_timeout(cmd, timeout, output_limit_bytes) {
        Ok(output) => output,
        Err(err) => {
            let fault = Fault::ActionFault(format!("{err:#}"));
            return ExecOutcome::from_fault(&fault, started.elapsed());
        }
    };

    if output.timed_out {
        let fault = Fault::ActionTimeout {
            timeout_secs: timeout.as_secs(),
        };
        return ExecOutcome::from_fault(&fault, started.elapsed());
    }

    let success = output.status.success();
    ExecOutcome {
        success,
        exit_code: output.status.code(),
        output: Some(output.stdout_text()),
        error: (!success).then(|| output.stderr_text()),
        elapsed: started.elapsed(),
        timed_out: false,
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// On timeout the child's whole process group is killed so shell pipelines do not linger.
/// Output collection shares the deadline: a background job that keeps the pipes open after the
/// child exits is killed and reported as a timeout.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel();
    let stdout_tx = tx.clone();
    thread::spawn(move || {
        let read = read_stream_limited(stdout, output_limit_bytes);
        let _ = stdout_tx.send((Stream::Stdout, read));
    });
    thread::spawn(move || {
        let read = read_stream_limited(stderr, output_limit_bytes);
        let _ = tx.send((Stream::Stderr, read));
    });

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_tree(&mut child);
            child.wait().context("wait command after kill")?
        }
    };

    // A backgrounded grandchild can keep the pipes open after the child exits.
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let wait = if timed_out {
            KILL_GRACE
        } else {
            deadline.saturating_duration_since(Instant::now())
        };
        match rx.recv_timeout(wait) {
            Ok((Stream::Stdout, result)) => stdout = Some(result.context("read stdout")?),
            Ok((Stream::Stderr, result)) => stderr = Some(result.context("read stderr")?),
            Err(RecvTimeoutError::Timeout) if !timed_out => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "output still open after exit, killing process group"
                );
                timed_out = true;
                kill_tree(&mut child);
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("output readers did not finish after kill");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(anyhow!("output reader thread panicked"));
            }
        }
    }
    let (stdout, stdout_truncated) = stdout.unwrap_or_default();
    let (stderr, stderr_truncated) = stderr.unwrap_or_default();

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill the child and, on unix, every process in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => debug!(exit_code = ?status.code(), "kill process group failed"),
            Err(e) => debug!(err = %e, "spawn kill failed"),
        }
    }
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill child failed");
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 64 * 1024;

    #[test]
    fn zero_exit_is_success_without_error() {
        let outcome = run_shell("echo done", Duration::from_secs(5), LIMIT);
        assert!(outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("done\n"));
        assert_eq!(outcome.error, None);
        assert!(!outcome.timed_out);
    }

    #[test]
    fn non_zero_exit_captures_both_streams() {
        let outcome = run_shell(
            "echo partial; echo broken >&2; exit 3",
            Duration::from_secs(5),
            LIMIT,
        );
        assert!(!outcome.success);
        assert_eq!(outcome.output.as_deref(), Some("partial\n"));
        assert_eq!(outcome.error.as_deref(), Some("broken\n"));
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[test]
    fn timeout_kills_child_and_synthesizes_error() {
        let outcome = run_shell("sleep 5; echo late", Duration::from_secs(1), LIMIT);
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert_eq!(outcome.output, None);
        assert_eq!(
            outcome.error.as_deref(),
            Some("command timed out after 1s")
        );
        assert!(outcome.elapsed < Duration::from_secs(4));
    }

    #[test]
    fn backgrounded_grandchild_cannot_outlive_timeout() {
        let outcome = run_shell("sleep 5 & echo started", Duration::from_secs(1), LIMIT);
        assert!(!outcome.success);
        assert!(outcome.timed_out);
        assert_eq!(
            outcome.error.as_deref(),
            Some("command timed out after 1s")
        );
        assert!(outcome.elapsed < Duration::from_secs(4));
    }

    #[test]
    fn unknown_command_is_a_failed_outcome() {
        let outcome = run_shell(
            "definitely-not-a-command-loopai",
            Duration::from_secs(5),
            LIMIT,
        );
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn output_beyond_limit_is_drained_and_dropped() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("printf 'abcdef'");
        let output =
            run_command_with_timeout(cmd, Duration::from_secs(5), 4).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
    }
}
