//! Blocking subprocess runner with an optional timeout
//!
//! A call that outlives its timeout is killed. By default a timed-out call
//! counts as a success with empty output (some service manager calls may
//! legitimately hang); callers that cannot accept that ask for
//! [`Shell::run_strict`].

use crate::error::{GatewayError, GatewayResult};
use std::ffi::OsStr;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of one subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when killed by a signal or timed out
    pub code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Whether the call was killed after its timeout
    pub timed_out: bool,
}

impl CommandOutput {
    /// Whether the call exited with status 0 (a timeout also counts)
    pub fn success(&self) -> bool {
        self.timed_out || self.code == Some(0)
    }
}

/// Subprocess runner
#[derive(Debug, Clone, Copy, Default)]
pub struct Shell {
    timeout: Option<Duration>,
}

impl Shell {
    /// Runner that waits forever
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that kills calls after `timeout`; zero means no timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: (!timeout.is_zero()).then_some(timeout),
        }
    }

    /// Run and capture; a timeout yields a successful empty output
    pub fn run<S: AsRef<OsStr>>(&self, program: &OsStr, args: &[S]) -> GatewayResult<CommandOutput> {
        self.execute(program, args, false)
    }

    /// Run and capture; a timeout is an error
    pub fn run_strict<S: AsRef<OsStr>>(&self, program: &OsStr, args: &[S]) -> GatewayResult<CommandOutput> {
        self.execute(program, args, true)
    }

    fn execute<S: AsRef<OsStr>>(
        &self,
        program: &OsStr,
        args: &[S],
        fail_on_timeout: bool,
    ) -> GatewayResult<CommandOutput> {
        let cmdline = describe(program, args);
        tracing::debug!("Running {}", cmdline);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GatewayError::Command {
                command: cmdline.clone(),
                detail: e.to_string(),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match self.wait(&mut child)? {
            Some(status) => Ok(CommandOutput {
                code: status.code(),
                stdout: collect(stdout),
                stderr: collect(stderr),
                timed_out: false,
            }),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!("{} timed out", cmdline);
                if fail_on_timeout {
                    return Err(GatewayError::Command {
                        command: cmdline,
                        detail: "timed out".to_string(),
                    });
                }
                Ok(CommandOutput {
                    timed_out: true,
                    ..Default::default()
                })
            }
        }
    }

    /// Wait for exit; `None` once the timeout has passed
    fn wait(&self, child: &mut Child) -> GatewayResult<Option<ExitStatus>> {
        let Some(timeout) = self.timeout else {
            return Ok(Some(child.wait()?));
        };

        let deadline = Instant::now() + timeout;
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
}

/// Run and require exit status 0
pub fn checked<S: AsRef<OsStr>>(shell: &Shell, program: &OsStr, args: &[S]) -> GatewayResult<CommandOutput> {
    let output = shell.run(program, args)?;
    if !output.success() {
        return Err(GatewayError::Command {
            command: describe(program, args),
            detail: failure_detail(&output),
        });
    }
    Ok(output)
}

/// Human-readable summary of a failed call
pub fn failure_detail(output: &CommandOutput) -> String {
    let status = match output.code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    };
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        status
    } else {
        format!("{}: {}", status, stderr)
    }
}

fn describe<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    let mut parts = vec![program.to_string_lossy().into_owned()];
    parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
    parts.join(" ")
}

// Pipes are drained on their own threads so a chatty child never blocks on
// a full pipe while we poll for its exit.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_status() {
        let shell = Shell::new();
        let out = shell
            .run(OsStr::new("sh"), &["-c", "echo out; echo err >&2; exit 3"])
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert!(!out.success());
        assert_eq!(failure_detail(&out), "exit status 3: err");
    }

    #[test]
    fn test_timeout_is_success_unless_strict() {
        let shell = Shell::with_timeout(Duration::from_millis(200));
        let out = shell.run(OsStr::new("sleep"), &["5"]).unwrap();
        assert!(out.timed_out);
        assert!(out.success());
        assert!(out.stdout.is_empty());

        let err = shell.run_strict(OsStr::new("sleep"), &["5"]).unwrap_err();
        assert!(matches!(err, GatewayError::Command { .. }));
    }

    #[test]
    fn test_missing_program() {
        let err = Shell::new()
            .run(OsStr::new("/nonexistent/ovpnctl-test"), &[] as &[&str])
            .unwrap_err();
        assert!(matches!(err, GatewayError::Command { .. }));
    }

    #[test]
    fn test_checked_rejects_failure() {
        assert!(checked(&Shell::new(), OsStr::new("true"), &[] as &[&str]).is_ok());
        assert!(checked(&Shell::new(), OsStr::new("false"), &[] as &[&str]).is_err());
    }
}
