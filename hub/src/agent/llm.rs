//! The pluggable LLM backend: a minimal chat-completion contract the agent
//! loop drives, extending the trait-adapter idiom already used for
//! `CallHandler` and `DeviceAuthenticator` so a real provider (HTTP call to
//! an LLM API) and a test double share one seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One tool invocation the model requested.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: serde_json::Map<String, Value>,
}

/// A completion either asks for tool calls or delivers a final answer.
/// Never both: the dispatcher treats a non-empty `tool_calls` as the whole
/// reply and ignores any `content` alongside it.
#[derive(Debug, Clone)]
pub enum LlmReply {
    ToolCalls(Vec<ToolCall>),
    Final(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmReply, String>;
}
