//! Validates and executes skill calls arriving from the sandbox.
//!
//! Three dispatch prefixes, checked in order:
//! - `remote:Device.Skill.method`: routed to the hub connection's device
//!   proxy chain
//! - `device_manager.<method>` / `devices.<method>`: routed to the same
//!   remote surface's discovery methods (`search_skills`, `describe_function`)
//! - anything else: a local `Class.method` call, validated against the
//!   allow-list first

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use shared::sanitize::sanitize_skill_error;
use shared::CoreError;

/// The remote surface a gatekeeper dispatches `remote:`/`device_manager.`/
/// `devices.` calls to. Implemented by the hub connection manager; absent
/// entirely in fully offline/local-only deployments.
#[async_trait::async_trait]
pub trait RemoteDispatch: Send + Sync {
    async fn call_remote(
        &self,
        device_name: &str,
        skill_name: &str,
        method_name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, String>;

    async fn search_skills(&self, query: &str) -> Result<Value, String>;
    async fn describe_function(&self, path: &str) -> Result<Value, String>;
}

pub struct Gatekeeper {
    catalog: Arc<Catalog>,
    remote: Option<Arc<dyn RemoteDispatch>>,
}

impl Gatekeeper {
    pub fn new(catalog: Arc<Catalog>, remote: Option<Arc<dyn RemoteDispatch>>) -> Self {
        let gatekeeper = Self { catalog, remote };
        gatekeeper.log_allow_list();
        gatekeeper
    }

    fn log_allow_list(&self) {
        let allow = self.catalog.allow_list();
        info!(count = allow.len(), "gatekeeper allow-list updated");
        debug!(paths = ?allow.paths().collect::<Vec<_>>(), "allow-list contents");
    }

    /// Call after the catalog changes (skill reload) to pick up the new
    /// allow-list; the catalog itself is the source of truth so there is
    /// nothing to rebuild here beyond re-emitting the log line.
    pub fn refresh(&self) {
        self.log_allow_list();
    }

    pub fn is_allowed(&self, path: &str) -> bool {
        self.catalog.allow_list().is_allowed(path)
    }

    pub async fn execute(
        &self,
        path: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, CoreError> {
        if let Some(rest) = path.strip_prefix("remote:") {
            return self.execute_remote(rest, args, kwargs).await;
        }
        if let Some(method) = path.strip_prefix("device_manager.") {
            return self.execute_device_manager(method, args, kwargs).await;
        }
        if let Some(method) = path.strip_prefix("devices.") {
            return self.execute_device_manager(method, args, kwargs).await;
        }

        if !self.is_allowed(path) {
            warn!(%path, "blocked skill call");
            return Err(CoreError::SkillNotAllowed(path.to_string()));
        }

        info!(%path, "executing local skill");
        let mut parts = path.splitn(2, '.');
        let (Some(class_name), Some(method_name)) = (parts.next(), parts.next()) else {
            return Err(CoreError::SkillRuntime(format!("Invalid path format: {path}")));
        };

        let result = self.catalog.call(class_name, method_name, args, kwargs);
        match &result {
            Ok(value) => debug!(?value, "skill result"),
            Err(e) => warn!(%path, error = %e, "skill execution error"),
        }
        result
    }

    async fn execute_remote(
        &self,
        path: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, CoreError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| CoreError::DeviceNotConnected("remote mode not available".into()))?;

        let parts: Vec<&str> = path.split('.').collect();
        let [device_name, skill_name, method_name] = parts[..] else {
            return Err(CoreError::SkillRuntime(format!(
                "Invalid remote path: {path}. Expected: Device.Skill.method"
            )));
        };

        info!(%path, "executing remote skill");
        remote
            .call_remote(device_name, skill_name, method_name, args, kwargs)
            .await
            .map_err(|e| CoreError::RemoteRuntime(sanitize_skill_error(&e)))
    }

    async fn execute_device_manager(
        &self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, CoreError> {
        let remote = self
            .remote
            .as_ref()
            .ok_or_else(|| CoreError::DeviceNotConnected("remote mode not available".into()))?;

        info!(%method, "executing device_manager call");
        match method {
            "search_skills" => {
                let query = args
                    .first()
                    .and_then(|v| v.as_str())
                    .or_else(|| kwargs.get("query").and_then(|v| v.as_str()))
                    .unwrap_or("")
                    .to_string();
                remote
                    .search_skills(&query)
                    .await
                    .map_err(|e| CoreError::RemoteRuntime(sanitize_skill_error(&e)))
            }
            "describe_function" => {
                let path = args
                    .first()
                    .and_then(|v| v.as_str())
                    .or_else(|| kwargs.get("path").and_then(|v| v.as_str()))
                    .unwrap_or("")
                    .to_string();
                remote
                    .describe_function(&path)
                    .await
                    .map_err(|e| CoreError::RemoteRuntime(sanitize_skill_error(&e)))
            }
            other => Err(CoreError::SkillRuntime(format!(
                "Unknown device_manager method: {other}"
            ))),
        }
    }
}
