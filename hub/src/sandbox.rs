//! Wires the shared sandbox executor to this Hub's remote skill surface:
//! inbound `call` messages from the child interpreter are resolved either
//! against the aggregate skill registry's discovery helpers or by routing a
//! `devices.<device>.<Skill>.<method>` call through the connection manager.
//!
//! Mirrors `spoke::sandbox::GatekeeperCallHandler` one level up: the Spoke's
//! handler answers `call` locally via a `Gatekeeper`, this one answers it by
//! reaching across the network to a connected Spoke.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use shared::sandbox::CallHandler;
pub use shared::sandbox::{
    BridgeClient, BridgeError, DirectExecutor, ExecutionResult, SandboxConfig, SandboxExecutor,
    SandboxProcessConfig, SandboxProcessManager,
};

use crate::connection::ConnectionManager;
use crate::skills::SkillRegistry;

/// Answers sandboxed `call` messages for one agent turn, scoped to the
/// session's owning user: `devices.search_skills`/`devices.describe_function`
/// resolve against that user's aggregate skill registry; everything else is
/// parsed as `devices.<device_name>.<Skill>.<method>` and routed over the
/// connection manager.
pub struct HubCallHandler {
    connections: Arc<ConnectionManager>,
    registry: Arc<SkillRegistry>,
    user_id: String,
    request_timeout: Duration,
}

impl HubCallHandler {
    pub fn new(
        connections: Arc<ConnectionManager>,
        registry: Arc<SkillRegistry>,
        user_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            connections,
            registry,
            user_id: user_id.into(),
            request_timeout,
        }
    }

    async fn handle_discovery(&self, method: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, String> {
        match method {
            "search_skills" => {
                let query = args
                    .first()
                    .and_then(|v| v.as_str())
                    .or_else(|| kwargs.get("query").and_then(|v| v.as_str()))
                    .unwrap_or("")
                    .to_string();
                let results = self.registry.search_skills(&self.user_id, &query, 100).await?;
                serde_json::to_value(
                    results
                        .into_iter()
                        .map(|r| {
                            serde_json::json!({
                                "class_name": r.class_name,
                                "method_name": r.method_name,
                                "signature": r.signature,
                                "summary": r.summary,
                                "devices": r.devices,
                                "call_example": r.call_example,
                                "python_exec_example": r.python_exec_example,
                            })
                        })
                        .collect::<Vec<_>>(),
                )
                .map_err(|e| e.to_string())
            }
            "describe_function" => {
                let path = args
                    .first()
                    .and_then(|v| v.as_str())
                    .or_else(|| kwargs.get("path").and_then(|v| v.as_str()))
                    .unwrap_or("")
                    .to_string();
                let text = self.registry.describe_function(&self.user_id, &path).await?;
                Ok(Value::String(text))
            }
            other => Err(format!("Unknown devices method: {other}")),
        }
    }
}

#[async_trait]
impl CallHandler for HubCallHandler {
    async fn handle(&self, path: String, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, String> {
        let Some(rest) = path.strip_prefix("devices.") else {
            return Err(format!("Unknown call path: {path}. Expected devices.<...>"));
        };

        let parts: Vec<&str> = rest.split('.').collect();
        match parts.as_slice() {
            [method] => self.handle_discovery(method, args, kwargs).await,
            [device_name, skill_name, method_name] => self
                .connections
                .send_skill_request(device_name, skill_name, method_name, args, kwargs, self.request_timeout)
                .await
                .map_err(|e| e.to_string()),
            _ => Err(format!(
                "Invalid remote path: {rest}. Expected devices.<device>.<Skill>.<method> or devices.<discovery method>"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteStore;

    #[tokio::test]
    async fn unknown_prefix_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("hub.db")).unwrap());
        let connections = Arc::new(ConnectionManager::new());
        let registry = Arc::new(SkillRegistry::new(store, connections.clone(), 120));
        let handler = HubCallHandler::new(connections, registry, "user1", Duration::from_secs(1));
        let err = handler
            .handle("local.Foo.bar".into(), vec![], Default::default())
            .await
            .unwrap_err();
        assert!(err.contains("Unknown call path"));
    }

    #[tokio::test]
    async fn device_not_connected_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("hub.db")).unwrap());
        let connections = Arc::new(ConnectionManager::new());
        let registry = Arc::new(SkillRegistry::new(store, connections.clone(), 120));
        let handler = HubCallHandler::new(connections, registry, "user1", Duration::from_millis(50));
        let err = handler
            .handle("devices.kitchen.LightSkill.on".into(), vec![], Default::default())
            .await
            .unwrap_err();
        assert!(err.contains("not currently connected"));
    }

    #[tokio::test]
    async fn discovery_describe_function_routes_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("hub.db")).unwrap());
        let connections = Arc::new(ConnectionManager::new());
        let registry = Arc::new(SkillRegistry::new(store, connections.clone(), 120));
        let handler = HubCallHandler::new(connections, registry, "user1", Duration::from_secs(1));
        let result = handler
            .handle("devices.describe_function".into(), vec![serde_json::json!("Nope.thing")], Default::default())
            .await
            .unwrap();
        assert_eq!(result, Value::String("Function not found: Nope.thing".into()));
    }
}
