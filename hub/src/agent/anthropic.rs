//! A concrete `LlmClient` backed by the Anthropic Messages API, the one
//! real HTTP call this crate makes. Grounded in the teacher's `reqwest`
//! dependency (declared for its own AI adapter layer) - same `reqwest`
//! crate, same JSON POST shape, adapted to the three-tool contract the
//! agent loop dispatches against.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::llm::{ChatMessage, LlmClient, LlmReply, Role, ToolCall};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 1024,
        }
    }

    fn tool_definitions() -> Vec<Value> {
        vec![
            json!({
                "name": "search_skills",
                "description": "Search the registered skills across connected devices.",
                "input_schema": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "device_limit": { "type": "integer" }
                    },
                    "required": ["query"]
                }
            }),
            json!({
                "name": "describe_function",
                "description": "Describe a skill method by its 'Class.method' path.",
                "input_schema": {
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"]
                }
            }),
            json!({
                "name": "python_exec",
                "description": "Run Python against the device proxy to invoke one or more skills.",
                "input_schema": {
                    "type": "object",
                    "properties": { "code": { "type": "string" } },
                    "required": ["code"]
                }
            }),
        ]
    }
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<LlmReply, String> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": role_str(&m.role), "content": m.content }))
            .collect();

        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": turns,
            "tools": Self::tool_definitions(),
        });

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("anthropic request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("anthropic API error {status}: {text}"));
        }

        let payload: Value = response.json().await.map_err(|e| format!("invalid anthropic response: {e}"))?;
        parse_reply(&payload)
    }
}

fn parse_reply(payload: &Value) -> Result<LlmReply, String> {
    let blocks = payload
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| "anthropic response missing content blocks".to_string())?;

    let mut tool_calls = Vec::new();
    let mut text = String::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("tool_use") => {
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                let kwargs = input.as_object().cloned().unwrap_or_default();
                tool_calls.push(ToolCall { name, args: Vec::new(), kwargs });
            }
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            other => warn!(?other, "unrecognized anthropic content block type"),
        }
    }

    if !tool_calls.is_empty() {
        Ok(LlmReply::ToolCalls(tool_calls))
    } else {
        Ok(LlmReply::Final(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_only_reply_as_final() {
        let payload = json!({ "content": [{ "type": "text", "text": "hello there" }] });
        let reply = parse_reply(&payload).unwrap();
        assert!(matches!(reply, LlmReply::Final(text) if text == "hello there"));
    }

    #[test]
    fn parses_tool_use_block_as_tool_call() {
        let payload = json!({
            "content": [{
                "type": "tool_use",
                "name": "search_skills",
                "input": { "query": "weather" }
            }]
        });
        let reply = parse_reply(&payload).unwrap();
        match reply {
            LlmReply::ToolCalls(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "search_skills");
                assert_eq!(calls[0].kwargs.get("query").unwrap(), "weather");
            }
            _ => panic!("expected tool calls"),
        }
    }
}
