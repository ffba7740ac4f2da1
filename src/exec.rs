//! External command execution.
//!
//! The readers only ever need "run this, give me stdout or an error". The
//! [`CommandRunner`] trait is that seam; [`SystemRunner`] is the real one,
//! with a timeout and a cap on captured output.

use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::CommandLimits;
use crate::error::{Error, Result};

/// Runs one external command to completion.
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning stdout on success.
    ///
    /// Non-zero exit, timeout and oversized output are all errors.
    async fn run(&self, program: &str, args: &[String]) -> Result<String>;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    limits: CommandLimits,
}

impl SystemRunner {
    /// Create a runner with the given limits.
    pub fn new(limits: CommandLimits) -> Self {
        Self { limits }
    }
}

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        tracing::debug!(program, ?args, "running external command");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::CommandFailed {
                command: program.to_string(),
                stderr: e.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("child stderr not captured".into()))?;

        let limit = self.limits.max_output;
        let cap = limit as u64 + 1;

        let run = async move {
            let child = Mutex::new(child);
            let kill = || {
                // a child blocked on a full pipe never closes the other one
                if let Ok(mut child) = child.lock() {
                    let _ = child.start_kill();
                }
            };

            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) = tokio::join!(
                async {
                    let mut reader = stdout.take(cap);
                    let read = reader.read_to_end(&mut out).await;
                    if out.len() > limit {
                        kill();
                        // grandchildren still writing get EPIPE
                        drop(reader);
                    }
                    read
                },
                async {
                    let mut reader = stderr.take(cap);
                    let read = reader.read_to_end(&mut err).await;
                    if err.len() > limit {
                        kill();
                        drop(reader);
                    }
                    read
                },
            );
            read_out?;
            read_err?;
            if out.len() > limit || err.len() > limit {
                return Ok(None);
            }
            let mut child = child.into_inner().unwrap_or_else(PoisonError::into_inner);
            let status = child.wait().await?;
            Ok::<_, std::io::Error>(Some((status, out, err)))
        };

        let finished = tokio::time::timeout(self.limits.timeout, run)
            .await
            .map_err(|_| Error::CommandTimeout {
                command: program.to_string(),
                secs: self.limits.timeout.as_secs(),
            })??;

        let Some((status, out, err)) = finished else {
            return Err(Error::OutputTooLarge {
                command: program.to_string(),
                limit,
            });
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&err).trim().to_string();
            let stderr = if stderr.is_empty() {
                format!("exited with {status}")
            } else {
                stderr
            };
            tracing::debug!(program, %stderr, "external command failed");
            return Err(Error::CommandFailed {
                command: program.to_string(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".into(), script.into()]
    }

    #[test]
    fn captures_stdout() {
        let runner = SystemRunner::default();
        let out = tokio_test::block_on(runner.run("sh", &sh("printf hello"))).unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let runner = SystemRunner::default();
        let err = runner
            .run("sh", &sh("echo 'does not exist' >&2; exit 1"))
            .await
            .unwrap_err();
        match err {
            Error::CommandFailed { command, stderr } => {
                assert_eq!(command, "sh");
                assert_eq!(stderr, "does not exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn times_out() {
        let runner = SystemRunner::new(CommandLimits {
            timeout: Duration::from_millis(200),
            ..CommandLimits::default()
        });
        let err = runner.run("sh", &sh("sleep 5")).await.unwrap_err();
        assert!(matches!(err, Error::CommandTimeout { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn rejects_oversized_output() {
        let runner = SystemRunner::new(CommandLimits {
            max_output: 16,
            ..CommandLimits::default()
        });
        let err = runner
            .run("sh", &sh("head -c 4096 /dev/zero"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OutputTooLarge { limit: 16, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn rejects_oversized_stderr_before_the_timeout() {
        let runner = SystemRunner::new(CommandLimits {
            max_output: 16,
            timeout: Duration::from_secs(10),
        });
        let err = runner
            .run("sh", &sh("head -c 1048576 /dev/zero >&2; sleep 30"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OutputTooLarge { limit: 16, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_program_is_a_command_failure() {
        let runner = SystemRunner::default();
        let err = runner
            .run("definitely-not-a-real-program-xyz", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }
}
