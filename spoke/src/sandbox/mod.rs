//! Wires the shared sandbox executor to this device's local `Gatekeeper`:
//! inbound `call` messages from the child interpreter are answered by
//! resolving and invoking the local skill catalog.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use shared::sandbox::CallHandler;
pub use shared::sandbox::{
    BridgeClient, BridgeError, DirectExecutor, ExecutionResult, SandboxConfig, SandboxExecutor,
    SandboxProcessConfig, SandboxProcessManager,
};

use crate::skills::Gatekeeper;

pub struct GatekeeperCallHandler {
    gatekeeper: Arc<Gatekeeper>,
}

impl GatekeeperCallHandler {
    pub fn new(gatekeeper: Arc<Gatekeeper>) -> Self {
        Self { gatekeeper }
    }
}

#[async_trait]
impl CallHandler for GatekeeperCallHandler {
    async fn handle(
        &self,
        path: String,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, String> {
        self.gatekeeper
            .execute(&path, args, kwargs)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::Catalog;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_path_is_reported_as_error() {
        let catalog = Arc::new(Catalog::new("dev1"));
        let gatekeeper = Arc::new(Gatekeeper::new(catalog, None));
        let handler = GatekeeperCallHandler::new(gatekeeper);
        let err = handler
            .handle("Foo.bar".into(), vec![json!(1)], Default::default())
            .await
            .unwrap_err();
        assert!(err.contains("not allowed") || err.contains("not found"));
    }
}
