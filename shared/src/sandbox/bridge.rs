//! Newline-delimited JSON bridge between the host and the sandbox's child
//! interpreter: a line-based `BufReader`/`write_all` pattern, layered with
//! id-correlated pending futures so concurrent `execute` calls (and
//! inbound `call` messages dispatched back out to a skill dispatcher) don't
//! interleave.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{SandboxMessage, SandboxMessageType, SkillCallData};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge I/O error: {0}")]
    Io(String),
    #[error("bridge protocol error: {0}")]
    Protocol(String),
    #[error("sandbox reported an error: {0}")]
    SandboxError(String),
}

/// Dispatches an inbound `call` message to whatever owns skill/device
/// routing on the host side (a local gatekeeper, a remote connection
/// manager). Kept as a trait so the bridge itself has no knowledge of
/// skill dispatch.
#[async_trait]
pub trait CallHandler: Send + Sync {
    async fn handle(
        &self,
        path: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, String>;
}

enum Outcome {
    Complete(Option<String>),
    Error(String),
}

pub struct BridgeClient {
    stdin: Arc<AsyncMutex<ChildStdin>>,
    pending: Arc<SyncMutex<HashMap<String, oneshot::Sender<Outcome>>>>,
    reader_task: Option<tokio::task::JoinHandle<()>>,
}

impl BridgeClient {
    /// Spawns the background reader task that drains `stdout`, routing
    /// `complete`/`error` replies to pending `execute` calls and `call`
    /// messages to `handler`.
    pub fn start(
        stdin: ChildStdin,
        mut stdout: BufReader<ChildStdout>,
        handler: Arc<dyn CallHandler>,
    ) -> Self {
        let pending: Arc<SyncMutex<HashMap<String, oneshot::Sender<Outcome>>>> =
            Arc::new(SyncMutex::new(HashMap::new()));
        let pending_for_reader = pending.clone();

        // stdin is owned jointly: `execute()` writes requests, the reader
        // task writes `call` replies, so both hold a clone of this handle.
        // A tokio Mutex is used (not parking_lot) because the guard is held
        // across the `.await` points of the writes below.
        let shared_stdin = Arc::new(AsyncMutex::new(stdin));
        let shared_stdin_for_reader = shared_stdin.clone();

        let reader_task = tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match stdout.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "sandbox bridge read error");
                        break;
                    }
                }
                if line.trim().is_empty() {
                    continue;
                }

                let message = match SandboxMessage::from_line(&line) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(error = %e, raw = %line.trim(), "malformed sandbox message");
                        continue;
                    }
                };

                match message.msg_type {
                    SandboxMessageType::Complete => {
                        let output = message.data.get("output").and_then(|v| v.as_str()).map(String::from);
                        if let Some(tx) = pending_for_reader.lock().remove(&message.id) {
                            let _ = tx.send(Outcome::Complete(output));
                        }
                    }
                    SandboxMessageType::Error => {
                        let error = message
                            .data
                            .get("error")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown sandbox error")
                            .to_string();
                        if let Some(tx) = pending_for_reader.lock().remove(&message.id) {
                            let _ = tx.send(Outcome::Error(error));
                        }
                    }
                    SandboxMessageType::Call => {
                        let handler = handler.clone();
                        let stdin = shared_stdin_for_reader.clone();
                        let id = message.id.clone();
                        let call_data: Result<SkillCallData, _> = serde_json::from_value(message.data);
                        tokio::spawn(async move {
                            let reply = match call_data {
                                Ok(call) => match handler.handle(call.path, call.args, call.kwargs).await {
                                    Ok(value) => SandboxMessage {
                                        msg_type: SandboxMessageType::Result,
                                        id: id.clone(),
                                        data: serde_json::json!({ "value": value }),
                                    },
                                    Err(error) => SandboxMessage {
                                        msg_type: SandboxMessageType::Error,
                                        id: id.clone(),
                                        data: serde_json::json!({ "error": error }),
                                    },
                                },
                                Err(e) => SandboxMessage {
                                    msg_type: SandboxMessageType::Error,
                                    id: id.clone(),
                                    data: serde_json::json!({ "error": format!("malformed call: {e}") }),
                                },
                            };
                            if let Ok(line) = reply.to_line() {
                                let mut guard = stdin.lock().await;
                                let _ = guard.write_all(line.as_bytes()).await;
                                let _ = guard.flush().await;
                            }
                        });
                    }
                    other => {
                        debug!(?other, "unexpected message direction from sandbox, ignoring");
                    }
                }
            }
        });

        Self {
            stdin: shared_stdin,
            pending,
            reader_task: Some(reader_task),
        }
    }

    /// Sends an `execute` message and awaits the matching `complete`/`error`
    /// reply. One in-flight execution at a time per the hard-kill-on-timeout
    /// design; callers serialize via `SandboxExecutor`'s lock.
    pub async fn execute(&self, code: &str, proxy_code: &str) -> Result<Option<String>, BridgeError> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        let message = SandboxMessage::execute(id.clone(), code, proxy_code);
        let line = message
            .to_line()
            .map_err(|e| BridgeError::Protocol(e.to_string()))?;

        {
            let mut stdin = self.stdin.lock().await;
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| BridgeError::Io(e.to_string()))?;
            stdin.flush().await.map_err(|e| BridgeError::Io(e.to_string()))?;
        }

        match rx.await {
            Ok(Outcome::Complete(output)) => Ok(output),
            Ok(Outcome::Error(error)) => Err(BridgeError::SandboxError(error)),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BridgeError::Io("bridge reader task ended".into()))
            }
        }
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}
