//! Wire protocol types for the two JSON channels in the system: the
//! sandbox's newline-delimited JSON bridge (host <-> child interpreter) and
//! the Hub<->Spoke WebSocket protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One line of the sandbox's newline-delimited JSON bridge. Every message
/// carries `type`, `id`, `data` regardless of direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxMessage {
    #[serde(rename = "type")]
    pub msg_type: SandboxMessageType,
    pub id: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMessageType {
    /// host -> sandbox: `{ code, proxy }`
    Execute,
    /// sandbox -> host: `{ path, args, kwargs }`
    Call,
    /// host -> sandbox: `{ value }`
    Result,
    /// host -> sandbox OR sandbox -> host: `{ error }`
    Error,
    /// sandbox -> host: `{ output }`
    Complete,
}

impl SandboxMessage {
    pub fn execute(id: impl Into<String>, code: &str, proxy: &str) -> Self {
        Self {
            msg_type: SandboxMessageType::Execute,
            id: id.into(),
            data: serde_json::json!({ "code": code, "proxy": proxy }),
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{}\n", serde_json::to_string(self)?))
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

/// Request body for a `call` message: a skill invocation issued by guest
/// code running in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCallData {
    pub path: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: serde_json::Map<String, Value>,
}

/// A message exchanged on the Hub<->Spoke WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// host -> device
    SkillRequest {
        request_id: String,
        skill_name: String,
        method_name: String,
        args: Vec<Value>,
        kwargs: serde_json::Map<String, Value>,
    },
    /// device -> host
    SkillResponse {
        request_id: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Ping,
    Pong,
}
