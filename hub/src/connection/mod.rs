//! The WebSocket listener: accepts Spoke connections, authenticates them by
//! bearer token, and hands each off to a per-connection read loop that
//! dispatches inbound frames into the `ConnectionManager`.
//!
//! Grounded in the teacher's `voice::call_server::{start_call_server,
//! handle_connection}`: `TcpListener::bind` + `accept()` loop spawning one
//! task per connection, `ws_stream.split()` into sender/receiver halves, and
//! an `mpsc` channel forwarding task so the socket's sender half is never
//! shared across tasks.

pub mod manager;

pub use manager::ConnectionManager;

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use shared::protocol::WsMessage;

/// Resolves a bearer token to the device identity it authenticates. A token
/// resolves to a unique device; deployments back this with a persisted
/// device/token table (see `crate::store`).
#[async_trait::async_trait]
pub trait DeviceAuthenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Option<String>;
}

/// Extracts `token` from a `?token=...` query string. Hand-rolled rather
/// than pulled from a crate: there is exactly one query parameter in the
/// documented wire contract.
fn extract_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    manager: Arc<ConnectionManager>,
    auth: Arc<dyn DeviceAuthenticator>,
) {
    let mut token = None;
    let callback = |req: &Request, response: Response| {
        token = req.uri().query().and_then(extract_token);
        Ok(response)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let Some(device_id) = (match token {
        Some(t) => auth.authenticate(&t).await,
        None => None,
    }) else {
        warn!(%addr, "connection rejected: missing or invalid bearer token");
        return;
    };

    info!(%addr, %device_id, "device connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Message>();

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let (close_tx, mut close_rx) = oneshot::channel::<()>();
    let generation = manager.register(device_id.clone(), msg_tx.clone(), close_tx);

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                info!(%device_id, "connection displaced by a newer one for the same device");
                break;
            }
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsMessage>(&text) {
                            Ok(WsMessage::SkillResponse { request_id, success, result, error }) => {
                                manager.resolve_skill_response(&request_id, success, result, error);
                            }
                            Ok(WsMessage::Ping) => {
                                let _ = msg_tx.send(Message::Text(
                                    serde_json::to_string(&WsMessage::Pong).unwrap_or_default().into(),
                                ));
                            }
                            Ok(WsMessage::Pong) => {}
                            Ok(WsMessage::SkillRequest { .. }) => {
                                warn!(%device_id, "ignoring unexpected skill_request from device");
                            }
                            Err(e) => {
                                warn!(%device_id, error = %e, "malformed frame, skipping");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%device_id, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    manager.disconnect(&device_id, generation);
    sender_task.abort();
    info!(%device_id, %addr, "device disconnected");
}

pub async fn run(
    addr: &str,
    manager: Arc<ConnectionManager>,
    auth: Arc<dyn DeviceAuthenticator>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "hub websocket listener started");

    loop {
        let (stream, addr) = listener.accept().await?;
        tokio::spawn(handle_connection(stream, addr, manager.clone(), auth.clone()));
    }
}
