//! Subprocess engines (whisper.cpp, Coqui `tts`).
//!
//! Children are spawned with `kill_on_drop`, so abandoning the stage future
//! (timeout, client disconnect) terminates the engine process. A semaphore per
//! adapter bounds how many engine processes run at once.

use crate::error::{EngineError, EngineResult};
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

const STDERR_TAIL_CHARS: usize = 400;

/// Bounded pool of engine process slots, owned by one adapter.
#[derive(Debug, Clone)]
pub(crate) struct ProcessPool {
    engine: &'static str,
    permits: Arc<Semaphore>,
}

impl ProcessPool {
    pub(crate) fn new(engine: &'static str, max_concurrent: usize) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub(crate) async fn acquire(&self) -> EngineResult<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Unavailable(format!("{} worker pool closed", self.engine)))
    }

    /// Run `cmd` to completion, mapping spawn failures and non-zero exits.
    pub(crate) async fn run(&self, mut cmd: Command) -> EngineResult<Output> {
        cmd.kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(target: "voxchat::process", engine = self.engine, command = ?cmd.as_std(), "spawning engine process");

        let output = cmd.output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                EngineError::Unavailable(format!("{} could not be started: {}", self.engine, e))
            }
            _ => EngineError::Internal(format!("{} process error: {}", self.engine, e)),
        })?;

        if !output.status.success() {
            return Err(EngineError::Internal(format!(
                "{} exited with {}: {}",
                self.engine,
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        Ok(output)
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let pool = ProcessPool::new("whisper-cli", 1);
        let err = pool
            .run(Command::new("/nonexistent/voxchat/whisper-cli"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_internal_with_stderr() {
        let pool = ProcessPool::new("tts", 1);
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 'model checkpoint missing' >&2; exit 3");
        let err = pool.run(cmd).await.unwrap_err();
        match err {
            EngineError::Internal(msg) => assert!(msg.contains("model checkpoint missing")),
            other => panic!("expected Internal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn pool_bounds_concurrency() {
        let pool = ProcessPool::new("whisper-cli", 1);
        let first = pool.acquire().await.unwrap();
        let second = tokio::time::timeout(std::time::Duration::from_millis(50), pool.acquire()).await;
        assert!(second.is_err(), "second permit must wait while the first is held");
        drop(first);
        assert!(pool.acquire().await.is_ok());
    }
}
