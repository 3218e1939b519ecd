//! The agent loop and skill proxy layer: drives an LLM through tool calls,
//! bridging the sandboxed code executor and the connection manager.

pub mod anthropic;
pub mod llm;
pub mod loop_;
pub mod prompt;

pub use anthropic::AnthropicClient;
pub use llm::{ChatMessage, LlmClient, LlmReply, Role, ToolCall};
pub use loop_::{AgentEvent, AgentLoop};
