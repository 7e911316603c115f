use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Resource limits for one execution
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Wall-clock budget; the process is killed when it runs out
    pub timeout: Duration,
    /// Per-stream output cap in bytes
    pub max_output: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits {
            timeout: Duration::from_secs(5),
            max_output: 64 * 1024,
        }
    }
}

/// What happened when the generated program ran
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    /// Captured standard output, possibly truncated
    pub stdout: String,
    /// Captured standard error, possibly truncated
    pub stderr: String,
    /// Process exited with status zero
    pub success: bool,
    /// Process was killed at the timeout
    pub timed_out: bool,
    /// Either stream hit the output cap
    pub truncated: bool,
    /// Wall-clock time spent
    pub duration: Duration,
}

/// Runs generated Python in a subprocess with a timeout and output caps
///
/// Failures fold into the [`ExecOutcome`]: a missing interpreter or a
/// crashing program is a reportable result, never a pipeline error.
pub struct Sandbox {
    limits: SandboxLimits,
    interpreter: String,
}

impl Sandbox {
    pub fn new() -> Self {
        Self::with_limits(SandboxLimits::default())
    }

    pub fn with_limits(limits: SandboxLimits) -> Self {
        Sandbox {
            limits,
            interpreter: "python3".to_string(),
        }
    }

    /// Executes the program with the given stdin contents
    ///
    /// `-I` runs the interpreter isolated: no site packages, no environment
    /// variables, no current-directory imports.
    pub async fn run(&self, code: &str, input: &str) -> ExecOutcome {
        let started = Instant::now();

        let mut child = match Command::new(&self.interpreter)
            .arg("-I")
            .arg("-c")
            .arg(code)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                tracing::warn!(%error, interpreter = %self.interpreter, "failed to start interpreter");
                return ExecOutcome {
                    stdout: String::new(),
                    stderr: format!("failed to start {}: {}", self.interpreter, error),
                    success: false,
                    timed_out: false,
                    truncated: false,
                    duration: started.elapsed(),
                };
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // A program that never reads its input makes this write fail
            // with a broken pipe; that is not an error.
            let _ = stdin.write_all(input.as_bytes()).await;
            let _ = stdin.shutdown().await;
        }

        let cap = self.limits.max_output;
        let stdout_task = child
            .stdout
            .take()
            .map(|reader| tokio::spawn(read_capped(reader, cap)));
        let stderr_task = child
            .stderr
            .take()
            .map(|reader| tokio::spawn(read_capped(reader, cap)));

        let (success, timed_out) = match tokio::time::timeout(self.limits.timeout, child.wait())
            .await
        {
            Ok(Ok(status)) => (status.success(), false),
            Ok(Err(error)) => {
                tracing::warn!(%error, "waiting on interpreter failed");
                (false, false)
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.limits.timeout, "execution timed out, killing process");
                let _ = child.start_kill();
                let _ = child.wait().await;
                (false, true)
            }
        };

        let (stdout, stdout_truncated) = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => (String::new(), false),
        };
        let (stderr, stderr_truncated) = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => (String::new(), false),
        };

        let duration = started.elapsed();
        tracing::debug!(success, timed_out, ?duration, "execution finished");

        ExecOutcome {
            stdout,
            stderr,
            success,
            timed_out,
            truncated: stdout_truncated || stderr_truncated,
            duration,
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a stream to the end, keeping at most `cap` bytes
///
/// Keeps draining past the cap so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> (String, bool) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut truncated = false;

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buffer.len() < cap {
                    let take = n.min(cap - buffer.len());
                    buffer.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
        }
    }

    (String::from_utf8_lossy(&buffer).into_owned(), truncated)
}
