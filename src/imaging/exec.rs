//! Bounded external process execution.
//!
//! Runs a program with an explicit argument list (no shell), captures stdout
//! and stderr on reader threads so a chatty child can't fill a pipe and stall,
//! and kills the child once the deadline passes.
//!
//! The deadline covers the whole call, output included. On unix the child
//! leads its own process group, so anything it leaves running in the
//! background holding a pipe open is killed along with it.

use super::backend::BackendError;
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Stream {
    Stdout,
    Stderr,
}

type Drained = (Stream, std::io::Result<Vec<u8>>);

/// Run `program` with `args`, returning stdout on a zero exit status.
///
/// Non-zero exit → [`BackendError::ProcessFailed`] carrying stderr.
/// Deadline exceeded, either waiting for exit or for the output pipes to
/// close → the process group is killed and [`BackendError::Timeout`] is
/// returned.
pub fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<Vec<u8>, BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let mut child = command.spawn()?;
    let deadline = Instant::now() + timeout;

    let (tx, rx) = mpsc::channel();
    let mut pending = 0;
    if let Some(pipe) = child.stdout.take() {
        drain(Stream::Stdout, pipe, tx.clone());
        pending += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        drain(Stream::Stderr, pipe, tx.clone());
        pending += 1;
    }
    drop(tx);

    let Some(status) = wait_until(&mut child, deadline)? else {
        return Err(timed_out(program, &mut child, timeout));
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for _ in 0..pending {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, bytes)) => stdout = bytes?,
            Ok((Stream::Stderr, bytes)) => stderr = bytes.unwrap_or_default(),
            Err(RecvTimeoutError::Timeout) => {
                return Err(timed_out(program, &mut child, timeout));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BackendError::BadOutput(
                    "output reader panicked".to_string(),
                ));
            }
        }
    }

    if !status.success() {
        return Err(BackendError::ProcessFailed {
            program: program.to_string(),
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }

    Ok(stdout)
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read + Send + 'static>(stream: Stream, mut pipe: R, tx: Sender<Drained>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        // Receiver is gone once the call has timed out.
        let _ = tx.send((stream, result));
    });
}

fn timed_out(program: &str, child: &mut Child, timeout: Duration) -> BackendError {
    kill_group(child);
    log::warn!("{program} killed after {}ms", timeout.as_millis());
    BackendError::Timeout {
        program: program.to_string(),
        secs: timeout.as_secs(),
    }
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: killpg only sends a signal; the group was created at spawn
        // with the child as leader, so pgid names our own descendants.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    // Already exited between the last poll and kill() is fine.
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const GENEROUS: Duration = Duration::from_secs(10);

    #[test]
    fn captures_stdout() {
        let out = run("sh", ["-c", "printf 640,480"], GENEROUS).unwrap();
        assert_eq!(out, b"640,480");
    }

    #[test]
    fn arguments_are_not_shell_interpreted() {
        let out = run("printf", ["%s", "a; echo injected"], GENEROUS).unwrap();
        assert_eq!(out, b"a; echo injected");
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let err = run("sh", ["-c", "echo boom >&2; exit 3"], GENEROUS).unwrap_err();
        match err {
            BackendError::ProcessFailed {
                program, stderr, ..
            } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected ProcessFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_io_error() {
        let err = run("definitely-not-a-real-tool-xyz", ["x"], GENEROUS).unwrap_err();
        assert!(matches!(err, BackendError::Io(_)));
    }

    #[test]
    fn slow_program_times_out() {
        let started = Instant::now();
        let err = run("sleep", ["5"], Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn background_child_holding_stdout_still_times_out() {
        let started = Instant::now();
        let err = run(
            "sh",
            ["-c", "sleep 3 & echo hi"],
            Duration::from_millis(500),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[test]
    fn timeout_kills_the_whole_process_group() {
        let tmp = tempfile::TempDir::new().unwrap();
        let marker = tmp.path().join("survived");
        let script = format!("(sleep 1 && touch '{}') & sleep 5", marker.display());

        let err = run("sh", ["-c", script.as_str()], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "background job outlived the timeout");
    }
}
