//! Builder-style stand-in for a dynamic attribute-chain proxy
//! (`DeviceProxy.__getattr__` -> `SkillProxy.__getattr__` -> `MethodProxy.
//! __call__` in the source this was distilled from). Rust has no
//! `__getattr__`; the equivalent here is an explicit three-step builder
//! that accumulates `(device, class, method)` before the terminal `call`,
//! so guest code never needs string-parsed dispatch paths: it calls
//! `devices.device("kitchen").skill("LightSkill").method("turn_on").call(...)`.

use serde_json::{Map, Value};

use crate::skills::gatekeeper::RemoteDispatch;
use shared::CoreError;
use std::sync::Arc;

/// Entry point mirroring the sandbox's injected `devices` object.
pub struct DevicesProxy {
    remote: Arc<dyn RemoteDispatch>,
}

impl DevicesProxy {
    pub fn new(remote: Arc<dyn RemoteDispatch>) -> Self {
        Self { remote }
    }

    pub fn device(&self, device_name: impl Into<String>) -> DeviceProxy {
        DeviceProxy {
            remote: self.remote.clone(),
            device_name: device_name.into(),
        }
    }
}

pub struct DeviceProxy {
    remote: Arc<dyn RemoteDispatch>,
    device_name: String,
}

impl DeviceProxy {
    pub fn skill(&self, skill_name: impl Into<String>) -> SkillProxy {
        SkillProxy {
            remote: self.remote.clone(),
            device_name: self.device_name.clone(),
            skill_name: skill_name.into(),
        }
    }
}

pub struct SkillProxy {
    remote: Arc<dyn RemoteDispatch>,
    device_name: String,
    skill_name: String,
}

impl SkillProxy {
    pub fn method(&self, method_name: impl Into<String>) -> MethodProxy {
        MethodProxy {
            remote: self.remote.clone(),
            device_name: self.device_name.clone(),
            skill_name: self.skill_name.clone(),
            method_name: method_name.into(),
        }
    }
}

pub struct MethodProxy {
    remote: Arc<dyn RemoteDispatch>,
    device_name: String,
    skill_name: String,
    method_name: String,
}

impl MethodProxy {
    /// The terminal call, equivalent to `MethodProxy.__call__`.
    pub async fn call(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, CoreError> {
        self.remote
            .call_remote(&self.device_name, &self.skill_name, &self.method_name, args, kwargs)
            .await
            .map_err(|e| CoreError::RemoteRuntime(shared::sanitize::sanitize_skill_error(&e)))
    }

    /// `"Device.Skill.method"`, matching the remote-path wire format the
    /// gatekeeper's `remote:` prefix expects.
    pub fn path(&self) -> String {
        format!("{}.{}.{}", self.device_name, self.skill_name, self.method_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StubRemote;
    #[async_trait::async_trait]
    impl RemoteDispatch for StubRemote {
        async fn call_remote(
            &self,
            device_name: &str,
            skill_name: &str,
            method_name: &str,
            _args: Vec<Value>,
            _kwargs: Map<String, Value>,
        ) -> Result<Value, String> {
            Ok(json!(format!("{device_name}.{skill_name}.{method_name}")))
        }
        async fn search_skills(&self, _query: &str) -> Result<Value, String> {
            Ok(json!([]))
        }
        async fn describe_function(&self, _path: &str) -> Result<Value, String> {
            Ok(json!(""))
        }
    }

    #[tokio::test]
    async fn chained_proxy_resolves_to_expected_path() {
        let devices = DevicesProxy::new(Arc::new(StubRemote));
        let method = devices.device("kitchen").skill("LightSkill").method("turn_on");
        assert_eq!(method.path(), "kitchen.LightSkill.turn_on");

        let result = method.call(vec![], Default::default()).await.unwrap();
        assert_eq!(result, json!("kitchen.LightSkill.turn_on"));
    }
}
