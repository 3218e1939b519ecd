//! The connection manager: tracks one live WebSocket per device and routes
//! `send_skill_request` RPCs to the matching connection, correlating
//! request/response pairs by `request_id`.
//!
//! Grounded in the teacher's `voice::call_server::CallManager`/
//! `handle_connection`: a map of live connections guarded by a lock with
//! short critical sections, an `mpsc` forwarding task decoupling the socket
//! sender from producer tasks, and a `tokio::select!` read loop. The
//! teacher's maps are keyed by call/participant and fan audio out to many
//! listeners; this one is keyed by device and resolves exactly one pending
//! request per response, per the RPC correlation contract.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};
use uuid::Uuid;

use shared::protocol::WsMessage;
use shared::sanitize::sanitize_skill_error;
use shared::CoreError;

/// Resolution of a single outstanding `send_skill_request`.
#[derive(Debug)]
enum PendingOutcome {
    Success(Value),
    Error(String),
}

struct Connection {
    /// Distinguishes this registration from a later one for the same
    /// device, so a stale `disconnect` from a displaced connection can
    /// never remove the connection that replaced it.
    generation: Uuid,
    msg_tx: mpsc::UnboundedSender<Message>,
    /// Fired when a later connection for the same device displaces this
    /// one, telling its read loop to stop.
    close_tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    connections: HashMap<String, Connection>,
    pending: HashMap<String, oneshot::Sender<PendingOutcome>>,
}

/// Two maps - live connections and pending RPCs - behind a single lock,
/// matching the documented data structure. The lock is never held across
/// an `.await`.
pub struct ConnectionManager {
    state: Mutex<State>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Registers a freshly authenticated connection. If a connection for
    /// the same device already exists, it is displaced: its `close_tx`
    /// fires, telling its read loop to stop and close the socket.
    pub fn register(
        &self,
        device_id: String,
        msg_tx: mpsc::UnboundedSender<Message>,
        close_tx: oneshot::Sender<()>,
    ) -> Uuid {
        let generation = Uuid::new_v4();
        let mut state = self.state.lock();
        if let Some(old) = state.connections.insert(
            device_id.clone(),
            Connection { generation, msg_tx, close_tx },
        ) {
            info!(%device_id, "displacing existing connection for device");
            let _ = old.close_tx.send(());
        }
        generation
    }

    /// Removes the connection iff it is still the one identified by
    /// `generation` - a stale read loop winding down after being displaced
    /// must not remove the connection that replaced it.
    pub fn disconnect(&self, device_id: &str, generation: Uuid) {
        let mut state = self.state.lock();
        if state
            .connections
            .get(device_id)
            .map(|c| c.generation)
            == Some(generation)
        {
            state.connections.remove(device_id);
        }
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        self.state.lock().connections.contains_key(device_id)
    }

    pub fn connected_devices(&self) -> Vec<String> {
        self.state.lock().connections.keys().cloned().collect()
    }

    /// Inbound `skill_response` dispatch: resolves the matching pending
    /// entry exactly once. An unknown `request_id` (a late response after
    /// timeout, or a bogus id) is logged and dropped, never fatal.
    pub fn resolve_skill_response(&self, request_id: &str, success: bool, result: Option<Value>, error: Option<String>) {
        let resolver = self.state.lock().pending.remove(request_id);
        let Some(resolver) = resolver else {
            warn!(%request_id, "orphan skill_response: no matching pending request");
            return;
        };
        let outcome = if success {
            PendingOutcome::Success(result.unwrap_or(Value::Null))
        } else {
            PendingOutcome::Error(error.unwrap_or_else(|| "unknown remote error".to_string()))
        };
        let _ = resolver.send(outcome);
    }

    /// Outbound RPC. Exactly one of {value, timeout, error} happens per
    /// call; the pending entry is always removed on exit regardless of
    /// which branch fires.
    pub async fn send_skill_request(
        &self,
        device_id: &str,
        skill_name: &str,
        method_name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, CoreError> {
        let msg_tx = {
            let state = self.state.lock();
            state
                .connections
                .get(device_id)
                .map(|c| c.msg_tx.clone())
        }
        .ok_or_else(|| CoreError::DeviceNotConnected(device_id.to_string()))?;

        let request_id = Uuid::new_v4().to_string();
        let (resolver_tx, resolver_rx) = oneshot::channel();
        self.state.lock().pending.insert(request_id.clone(), resolver_tx);

        let wire = WsMessage::SkillRequest {
            request_id: request_id.clone(),
            skill_name: skill_name.to_string(),
            method_name: method_name.to_string(),
            args,
            kwargs,
        };
        let text = serde_json::to_string(&wire)
            .map_err(|e| CoreError::BridgeProtocol(e.to_string()))?;

        if msg_tx.send(Message::Text(text.into())).is_err() {
            self.state.lock().pending.remove(&request_id);
            return Err(CoreError::DeviceNotConnected(device_id.to_string()));
        }

        info!(%device_id, %skill_name, %method_name, %request_id, "sent skill_request");
        let result = match tokio::time::timeout(timeout, resolver_rx).await {
            Ok(Ok(PendingOutcome::Success(value))) => Ok(value),
            Ok(Ok(PendingOutcome::Error(message))) => {
                Err(CoreError::RemoteRuntime(sanitize_skill_error(&message)))
            }
            Ok(Err(_)) => Err(CoreError::BridgeProtocol(
                "pending resolver dropped without a response".to_string(),
            )),
            Err(_) => Err(CoreError::RequestTimeout),
        };
        self.state.lock().pending.remove(&request_id);
        result
    }
}
