//! Orchestrates the sandboxed code executor: lazy process/bridge
//! initialization, timeout-bound execution with hard-kill-and-restart on
//! timeout, and an insecure direct-execution fallback for local development
//! when the sandbox is disabled.
//!
//! Generic over who answers inbound `call` messages (a local gatekeeper on
//! the Spoke, a connection manager routing to remote devices on the Hub) via
//! the `CallHandler` trait, so both processes share one executor.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::bridge::{BridgeClient, BridgeError, CallHandler};
use super::process::{ProcessError, SandboxProcessConfig, SandboxProcessManager};
use crate::sanitize::sanitize_sandbox_error;

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Hard-kill with no cleanup grace period.
    pub timeout_seconds: f64,
    pub memory_limit_mb: u32,
    pub interpreter_path: String,
    pub entry_script: String,
    /// Can be disabled for development; falls back to direct execution.
    pub enabled: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 5.0,
            memory_limit_mb: 128,
            interpreter_path: "deno".into(),
            entry_script: "sandbox_host.js".into(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn ok(output: Option<String>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            timed_out: false,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            timed_out: false,
        }
    }

    fn timeout(error: String) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error),
            timed_out: true,
        }
    }
}

/// Bypasses process isolation entirely (INSECURE, development only), used
/// when `SandboxConfig::enabled` is false. Executing arbitrary guest code
/// in-process is outside this component's scope; an embedder wires up
/// whatever local script host it trusts for that mode.
pub trait DirectExecutor: Send + Sync {
    fn execute(&self, code: &str) -> Result<Option<String>, String>;
}

#[derive(Default)]
struct SandboxState {
    process: Option<SandboxProcessManager>,
    bridge: Option<BridgeClient>,
}

pub struct SandboxExecutor {
    call_handler: Arc<dyn CallHandler>,
    config: SandboxConfig,
    proxy_code: String,
    direct_executor: Option<Arc<dyn DirectExecutor>>,
    state: Mutex<SandboxState>,
}

impl SandboxExecutor {
    pub fn new(
        call_handler: Arc<dyn CallHandler>,
        config: SandboxConfig,
        proxy_code: String,
        direct_executor: Option<Arc<dyn DirectExecutor>>,
    ) -> Self {
        Self {
            call_handler,
            config,
            proxy_code,
            direct_executor,
            state: Mutex::new(SandboxState::default()),
        }
    }

    async fn ensure_initialized<'a>(
        &self,
        state: &'a mut SandboxState,
    ) -> Result<&'a BridgeClient, ExecutionResult> {
        if state.bridge.is_some() {
            return Ok(state.bridge.as_ref().unwrap());
        }

        let mut process = SandboxProcessManager::new(SandboxProcessConfig {
            interpreter_path: self.config.interpreter_path.clone(),
            entry_script: self.config.entry_script.clone(),
        });

        let (stdin, stdout) = match process.start().await {
            Ok(pipes) => pipes,
            Err(ProcessError::InterpreterNotFound(path)) => {
                error!(%path, "sandbox interpreter not found");
                return Err(ExecutionResult::failed(format!(
                    "Sandbox unavailable ({path} not installed)"
                )));
            }
            Err(ProcessError::SpawnFailed(msg)) => {
                error!(error = %msg, "failed to spawn sandbox process");
                return Err(ExecutionResult::failed(format!(
                    "Sandbox unavailable: {msg}"
                )));
            }
        };

        let bridge = BridgeClient::start(stdin, stdout, self.call_handler.clone());

        info!("sandbox initialized successfully");
        state.process = Some(process);
        state.bridge = Some(bridge);
        Ok(state.bridge.as_ref().unwrap())
    }

    async fn cleanup(&self, state: &mut SandboxState) {
        if let Some(mut bridge) = state.bridge.take() {
            bridge.stop().await;
        }
        if let Some(mut process) = state.process.take() {
            process.kill().await;
        }
    }

    pub async fn execute(&self, code: &str) -> ExecutionResult {
        if !self.config.enabled {
            warn!("sandbox disabled, using direct execution (INSECURE)");
            return self.execute_direct(code);
        }

        let mut state = self.state.lock().await;
        let bridge = match self.ensure_initialized(&mut state).await {
            Ok(bridge) => bridge,
            Err(result) => return result,
        };

        let timeout = std::time::Duration::from_secs_f64(self.config.timeout_seconds);
        match tokio::time::timeout(timeout, bridge.execute(code, &self.proxy_code)).await {
            Ok(Ok(output)) => ExecutionResult::ok(output.map(|s| s.trim().to_string())),
            Ok(Err(BridgeError::SandboxError(e))) => {
                ExecutionResult::failed(sanitize_sandbox_error(&e))
            }
            Ok(Err(e)) => {
                error!(error = %e, "sandbox bridge error");
                self.cleanup(&mut state).await;
                ExecutionResult::failed(format!("Sandbox communication error: {e}"))
            }
            Err(_) => {
                error!(timeout_seconds = self.config.timeout_seconds, "sandbox execution timeout");
                self.cleanup(&mut state).await;
                ExecutionResult::timeout(format!(
                    "Execution timeout ({}s)",
                    self.config.timeout_seconds
                ))
            }
        }
    }

    fn execute_direct(&self, code: &str) -> ExecutionResult {
        match &self.direct_executor {
            Some(direct) => match direct.execute(code) {
                Ok(output) => ExecutionResult::ok(output.map(|s| s.trim().to_string())),
                Err(e) => ExecutionResult::failed(e),
            },
            None => ExecutionResult::failed(
                "direct execution is disabled: no DirectExecutor configured".into(),
            ),
        }
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.cleanup(&mut state).await;
        info!("sandbox shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value};

    struct NullHandler;

    #[async_trait]
    impl CallHandler for NullHandler {
        async fn handle(
            &self,
            path: String,
            _args: Vec<Value>,
            _kwargs: Map<String, Value>,
        ) -> Result<Value, String> {
            Err(format!("no handler configured for {path}"))
        }
    }

    fn handler() -> Arc<dyn CallHandler> {
        Arc::new(NullHandler)
    }

    #[tokio::test]
    async fn disabled_sandbox_without_direct_executor_reports_error() {
        let executor = SandboxExecutor::new(
            handler(),
            SandboxConfig {
                enabled: false,
                ..Default::default()
            },
            String::new(),
            None,
        );
        let result = executor.execute("print(1)").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("DirectExecutor"));
    }

    struct EchoDirect;
    impl DirectExecutor for EchoDirect {
        fn execute(&self, code: &str) -> Result<Option<String>, String> {
            Ok(Some(code.to_string()))
        }
    }

    #[tokio::test]
    async fn disabled_sandbox_with_direct_executor_runs_it() {
        let executor = SandboxExecutor::new(
            handler(),
            SandboxConfig {
                enabled: false,
                ..Default::default()
            },
            String::new(),
            Some(Arc::new(EchoDirect)),
        );
        let result = executor.execute("print(1)").await;
        assert!(result.success);
        assert_eq!(result.output.unwrap(), "print(1)");
    }

    #[tokio::test]
    async fn enabled_sandbox_with_missing_interpreter_reports_unavailable() {
        let executor = SandboxExecutor::new(
            handler(),
            SandboxConfig {
                interpreter_path: "definitely-not-a-real-interpreter-binary".into(),
                ..Default::default()
            },
            String::new(),
            None,
        );
        let result = executor.execute("print(1)").await;
        assert!(!result.success);
        assert!(!result.timed_out);
        assert!(result.error.unwrap().contains("Sandbox unavailable"));
    }
}
