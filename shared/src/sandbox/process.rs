//! Spawns and owns the sandbox's child interpreter process: a line-based
//! pipe I/O pattern adapted from a Unix-socket peer to a child process's
//! stdio.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("sandbox interpreter not found: {0}")]
    InterpreterNotFound(String),
    #[error("failed to spawn sandbox process: {0}")]
    SpawnFailed(String),
}

pub struct SandboxProcessConfig {
    pub interpreter_path: String,
    pub entry_script: String,
}

impl Default for SandboxProcessConfig {
    fn default() -> Self {
        Self {
            interpreter_path: "deno".into(),
            entry_script: "sandbox_host.js".into(),
        }
    }
}

/// Owns a single spawned sandbox process and its piped stdio.
pub struct SandboxProcessManager {
    config: SandboxProcessConfig,
    child: Option<Child>,
}

impl SandboxProcessManager {
    pub fn new(config: SandboxProcessConfig) -> Self {
        Self { config, child: None }
    }

    /// Spawns the interpreter, returning the stdin writer and a buffered
    /// stdout reader for the bridge to drive.
    pub async fn start(&mut self) -> Result<(ChildStdin, BufReader<ChildStdout>), ProcessError> {
        let mut command = Command::new(&self.config.interpreter_path);
        command
            .arg("run")
            .arg("--allow-none")
            .arg(&self.config.entry_script)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::InterpreterNotFound(self.config.interpreter_path.clone())
            } else {
                ProcessError::SpawnFailed(e.to_string())
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            ProcessError::SpawnFailed("child stdin not piped".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ProcessError::SpawnFailed("child stdout not piped".into())
        })?;

        self.child = Some(child);
        Ok((stdin, BufReader::new(stdout)))
    }

    /// Hard kill: no cleanup grace period, matching the documented
    /// kill-on-timeout semantics.
    pub async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_interpreter_reports_not_found() {
        let mut manager = SandboxProcessManager::new(SandboxProcessConfig {
            interpreter_path: "definitely-not-a-real-interpreter-binary".into(),
            entry_script: "x.js".into(),
        });
        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, ProcessError::InterpreterNotFound(_)));
    }

    #[tokio::test]
    async fn kill_without_start_is_a_no_op() {
        let mut manager = SandboxProcessManager::new(SandboxProcessConfig::default());
        manager.kill().await;
        assert!(!manager.is_running());
    }
}
