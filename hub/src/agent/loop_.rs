//! Drives the LLM across iterations for one chat session, materializing its
//! tool calls into discovery lookups, sandboxed code, or direct skill calls,
//! and feeding results back as synthetic conversation turns.
//!
//! Grounded in the teacher's cooperative-single-task-scheduling model (this
//! entire loop runs on the Tokio reactor, never a dedicated thread) and in
//! `skill_service.py`'s `_execute_dynamic_skill_tool` for the fallback
//! dispatch policy below.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{info, warn};

use shared::config::{AgentConfig, HubConfig, SkillsConfig};
use shared::error::CoreError;
use shared::sandbox::{ExecutionResult, SandboxConfig, SandboxExecutor};
use shared::skill::Skill;

use crate::agent::llm::{ChatMessage, LlmClient, LlmReply, Role, ToolCall};
use crate::agent::prompt::{hub_system_prompt, mode_switch_notice};
use crate::connection::ConnectionManager;
use crate::sandbox::HubCallHandler;
use crate::skills::SkillRegistry;
use crate::store::HubStore;

#[derive(Debug, Clone)]
pub enum AgentEvent {
    MessageAdded { session_id: String, role: &'static str, content: String },
    ToolCallStarted { session_id: String, name: String },
    ToolCallResult { session_id: String, name: String, success: bool, output: String },
    CoreError { session_id: String, message: String },
}

struct SessionState {
    user_id: String,
    messages: Vec<ChatMessage>,
    busy: bool,
    hub_mode_announced: bool,
}

pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn HubStore>,
    registry: Arc<SkillRegistry>,
    connections: Arc<ConnectionManager>,
    sessions: DashMap<String, Mutex<SessionState>>,
    sandboxes: DashMap<String, Arc<SandboxExecutor>>,
    agent_config: AgentConfig,
    hub_config: HubConfig,
    skills_config: SkillsConfig,
    events: broadcast::Sender<AgentEvent>,
}

impl AgentLoop {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn HubStore>,
        registry: Arc<SkillRegistry>,
        connections: Arc<ConnectionManager>,
        agent_config: AgentConfig,
        hub_config: HubConfig,
        skills_config: SkillsConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            llm,
            store,
            registry,
            connections,
            sessions: DashMap::new(),
            sandboxes: DashMap::new(),
            agent_config,
            hub_config,
            skills_config,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }

    /// Registers a session if this is the first time it's seen. Idempotent:
    /// a session already tracked in memory is left untouched.
    pub async fn ensure_session(
        &self,
        session_id: &str,
        device_id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<(), CoreError> {
        if self.sessions.contains_key(session_id) {
            return Ok(());
        }
        if self.store.session(session_id).await.map_err(CoreError::RemoteRuntime)?.is_none() {
            self.store
                .create_session(session_id, device_id, user_id, title)
                .await
                .map_err(CoreError::RemoteRuntime)?;
        }
        self.sessions.insert(
            session_id.to_string(),
            Mutex::new(SessionState {
                user_id: user_id.to_string(),
                messages: Vec::new(),
                busy: false,
                hub_mode_announced: false,
            }),
        );
        Ok(())
    }

    fn sandbox_for(&self, session_id: &str, user_id: &str) -> Arc<SandboxExecutor> {
        if let Some(existing) = self.sandboxes.get(session_id) {
            return existing.clone();
        }
        let handler = Arc::new(HubCallHandler::new(
            self.connections.clone(),
            self.registry.clone(),
            user_id,
            Duration::from_secs(self.hub_config.skill_request_timeout_secs),
        ));
        let executor = Arc::new(SandboxExecutor::new(
            handler,
            SandboxConfig {
                enabled: self.skills_config.sandbox_enabled,
                timeout_seconds: self.skills_config.sandbox_timeout_seconds,
                memory_limit_mb: self.skills_config.sandbox_memory_limit_mb,
                ..Default::default()
            },
            String::new(),
            None,
        ));
        self.sandboxes.insert(session_id.to_string(), executor.clone());
        executor
    }

    /// `send_message(session_id, text)` per the agent loop contract: appends
    /// a user turn, drives iterations up to `agent_max_iterations`, and
    /// leaves `session.busy == false` on every exit path.
    pub async fn send_message(&self, session_id: &str, text: &str) -> Result<(), CoreError> {
        let Some(entry) = self.sessions.get(session_id) else {
            return Err(CoreError::SkillNotFound(format!("unknown session {session_id}")));
        };

        let user_id = {
            let mut state = entry.lock();
            if state.busy {
                return Err(CoreError::AgentBusy);
            }
            state.busy = true;
            state.messages.push(ChatMessage::user(text));
            state.user_id.clone()
        };
        drop(entry);

        if let Err(e) = self.store.append_message(session_id, "user", text).await {
            warn!(%session_id, error = %e, "failed to persist user message");
        }
        self.emit(AgentEvent::MessageAdded {
            session_id: session_id.to_string(),
            role: "user",
            content: text.to_string(),
        });

        let result = self.run_iterations(session_id, &user_id).await;

        if let Some(entry) = self.sessions.get(session_id) {
            entry.lock().busy = false;
        }

        if let Err(e) = &result {
            self.emit(AgentEvent::CoreError { session_id: session_id.to_string(), message: e.to_string() });
        }
        result
    }

    async fn system_prompt_for(&self, session_id: &str, user_id: &str) -> String {
        let connected = self.connections.connected_devices();
        let catalog = self.registry.search_skills(user_id, "", 100).await.unwrap_or_default();
        let total_skills = catalog.len();
        let prompt = hub_system_prompt(total_skills, self.hub_config.prompt_embed_threshold, &connected, &catalog);

        if let Some(entry) = self.sessions.get(session_id) {
            let mut state = entry.lock();
            if !state.hub_mode_announced {
                state.hub_mode_announced = true;
                state.messages.push(ChatMessage::user(mode_switch_notice(true).to_string()));
                let _ = self.store.set_last_mode_prompt(session_id, "hub");
            }
        }
        prompt
    }

    async fn run_iterations(&self, session_id: &str, user_id: &str) -> Result<(), CoreError> {
        let max_iterations = self.agent_config.clamped_max_iterations();

        for _ in 0..max_iterations {
            let system_prompt = self.system_prompt_for(session_id, user_id).await;
            let messages = {
                let entry = self.sessions.get(session_id).expect("session present for its own turn");
                let state = entry.lock();
                let mut built = vec![ChatMessage::system(system_prompt)];
                built.extend(state.messages.iter().cloned());
                built
            };

            let reply = self.llm.complete(&messages).await.map_err(CoreError::RemoteRuntime)?;

            match reply {
                LlmReply::Final(content) => {
                    if let Some(entry) = self.sessions.get(session_id) {
                        entry.lock().messages.push(ChatMessage::assistant(content.clone()));
                    }
                    if let Err(e) = self.store.append_message(session_id, "assistant", &content).await {
                        warn!(%session_id, error = %e, "failed to persist assistant message");
                    }
                    self.emit(AgentEvent::MessageAdded {
                        session_id: session_id.to_string(),
                        role: "assistant",
                        content,
                    });
                    return Ok(());
                }
                LlmReply::ToolCalls(calls) => {
                    for call in calls {
                        self.emit(AgentEvent::ToolCallStarted {
                            session_id: session_id.to_string(),
                            name: call.name.clone(),
                        });
                        let outcome = self.dispatch_tool(session_id, user_id, &call).await;
                        let (success, output) = match outcome {
                            Ok(value) => (true, value),
                            Err(e) => (false, e),
                        };
                        self.emit(AgentEvent::ToolCallResult {
                            session_id: session_id.to_string(),
                            name: call.name.clone(),
                            success,
                            output: output.clone(),
                        });
                        if let Some(entry) = self.sessions.get(session_id) {
                            entry.lock().messages.push(ChatMessage::user(format!(
                                "[tool:{}] {}",
                                call.name, output
                            )));
                        }
                    }
                }
            }
        }

        info!(%session_id, max_iterations, "agent loop exhausted iterations, last observation stands");
        Ok(())
    }

    async fn dispatch_tool(&self, session_id: &str, user_id: &str, call: &ToolCall) -> Result<String, String> {
        match call.name.as_str() {
            "search_skills" => {
                let query = call.kwargs.get("query").and_then(|v| v.as_str()).unwrap_or("");
                let limit = call.kwargs.get("device_limit").and_then(|v| v.as_u64()).unwrap_or(100) as usize;
                let results = self.registry.search_skills(user_id, query, limit).await?;
                serde_json::to_string(&results.iter().map(result_to_json).collect::<Vec<_>>())
                    .map_err(|e| e.to_string())
            }
            "describe_function" => {
                let path = call.kwargs.get("path").and_then(|v| v.as_str()).unwrap_or("");
                self.registry.describe_function(user_id, path).await
            }
            "python_exec" => {
                let code = call.kwargs.get("code").and_then(|v| v.as_str()).unwrap_or("");
                let sandbox = self.sandbox_for(session_id, user_id);
                let ExecutionResult { success, output, error, timed_out: _ } = sandbox.execute(code).await;
                if success {
                    Ok(output.unwrap_or_default())
                } else {
                    Err(error.unwrap_or_else(|| "sandbox execution failed".to_string()))
                }
            }
            other => self.dynamic_dispatch(user_id, other, call.kwargs.clone()).await,
        }
    }

    /// The dynamic skill-tool fallback: the model invoked a skill method
    /// directly by name (bare `get_current_weather` or qualified
    /// `WeatherSkill.get_current_weather`) instead of going through
    /// `python_exec`. Resolved against the live catalog for this user,
    /// preferring a connected device, then alphabetically; unknown names
    /// get a message nudging the model back toward `python_exec`.
    async fn dynamic_dispatch(
        &self,
        user_id: &str,
        tool_name: &str,
        kwargs: Map<String, Value>,
    ) -> Result<String, String> {
        let (class_filter, method_name) = match tool_name.split_once('.') {
            Some((class, method)) => (Some(class.to_string()), method.to_string()),
            None => (None, tool_name.to_string()),
        };

        let now = Utc::now();
        let live = self.store.skills_for_user(user_id).await?;
        let mut candidates: Vec<Skill> = live
            .into_iter()
            .filter(|s| s.is_alive(now, self.skills_config.skill_expiry_seconds))
            .filter(|s| s.method_name == method_name)
            .filter(|s| class_filter.as_deref().map_or(true, |c| c == s.class_name))
            .collect();

        if candidates.is_empty() {
            return Err(match class_filter {
                Some(class) => format!(
                    "Unknown tool: {class}.{method_name}. Try search_skills or python_exec."
                ),
                None => format!("Unknown tool: {method_name}. Try search_skills or python_exec."),
            });
        }

        candidates.sort_by(|a, b| {
            let a_key = (!self.connections.is_connected(&a.device_id), a.device_id.clone());
            let b_key = (!self.connections.is_connected(&b.device_id), b.device_id.clone());
            a_key.cmp(&b_key)
        });
        let target = &candidates[0];

        self.connections
            .send_skill_request(
                &target.device_id,
                &target.class_name,
                &target.method_name,
                Vec::new(),
                kwargs,
                Duration::from_secs(self.hub_config.skill_request_timeout_secs),
            )
            .await
            .map(|v| v.to_string())
            .map_err(|e| e.to_string())
    }
}

fn result_to_json(r: &crate::skills::SkillSearchResult) -> Value {
    serde_json::json!({
        "class_name": r.class_name,
        "method_name": r.method_name,
        "signature": r.signature,
        "summary": r.summary,
        "devices": r.devices,
        "call_example": r.call_example,
        "python_exec_example": r.python_exec_example,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedLlm {
        replies: Mutex<Vec<LlmReply>>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<LlmReply, String> {
            let mut replies = self.replies.lock();
            Ok(replies.remove(0))
        }
    }

    async fn test_loop(replies: Vec<LlmReply>) -> (AgentLoop, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn HubStore> = Arc::new(crate::store::sqlite::SqliteStore::open(dir.path().join("hub.db")).unwrap());
        let connections = Arc::new(ConnectionManager::new());
        let registry = Arc::new(SkillRegistry::new(store.clone(), connections.clone(), 120));
        let llm = Arc::new(ScriptedLlm { replies: Mutex::new(replies) });
        let agent_loop = AgentLoop::new(
            llm,
            store,
            registry,
            connections,
            AgentConfig::default(),
            HubConfig::default(),
            SkillsConfig::default(),
        );
        (agent_loop, dir)
    }

    #[tokio::test]
    async fn final_reply_appends_exactly_one_assistant_message() {
        let (agent_loop, _dir) = test_loop(vec![LlmReply::Final("hi there".into())]).await;
        agent_loop.ensure_session("s1", "dev1", "user1", "chat").await.unwrap();
        agent_loop.send_message("s1", "hello").await.unwrap();

        let entry = agent_loop.sessions.get("s1").unwrap();
        let state = entry.lock();
        assert!(!state.busy);
        assert_eq!(state.messages.iter().filter(|m| m.role == Role::Assistant).count(), 1);
        assert_eq!(state.messages.iter().filter(|m| m.role == Role::User && m.content == "hello").count(), 1);
    }

    #[tokio::test]
    async fn busy_session_rejects_reentry() {
        let (agent_loop, _dir) = test_loop(vec![LlmReply::Final("ok".into())]).await;
        agent_loop.ensure_session("s1", "dev1", "user1", "chat").await.unwrap();
        {
            let entry = agent_loop.sessions.get("s1").unwrap();
            entry.lock().busy = true;
        }
        let err = agent_loop.send_message("s1", "hello").await.unwrap_err();
        assert!(matches!(err, CoreError::AgentBusy));
    }

    #[tokio::test]
    async fn exhausting_iterations_without_a_final_reply_still_clears_busy() {
        let replies: Vec<LlmReply> = (0..5)
            .map(|_| LlmReply::ToolCalls(vec![ToolCall { name: "search_skills".into(), args: vec![], kwargs: Map::new() }]))
            .collect();
        let (agent_loop, _dir) = test_loop(replies).await;
        agent_loop.ensure_session("s1", "dev1", "user1", "chat").await.unwrap();
        agent_loop.send_message("s1", "hello").await.unwrap();

        let entry = agent_loop.sessions.get("s1").unwrap();
        let state = entry.lock();
        assert!(!state.busy);
        assert!(state.messages.iter().all(|m| m.role != Role::Assistant));
    }

    #[tokio::test]
    async fn unknown_dynamic_tool_reports_helpful_error_not_a_crash() {
        let (agent_loop, _dir) = test_loop(vec![
            LlmReply::ToolCalls(vec![ToolCall { name: "turn_on_lights".into(), args: vec![], kwargs: Map::new() }]),
            LlmReply::Final("couldn't find that".into()),
        ])
        .await;
        agent_loop.ensure_session("s1", "dev1", "user1", "chat").await.unwrap();
        agent_loop.send_message("s1", "turn on the lights").await.unwrap();

        let entry = agent_loop.sessions.get("s1").unwrap();
        let state = entry.lock();
        let has_error_observation = state
            .messages
            .iter()
            .any(|m| m.content.contains("Unknown tool: turn_on_lights"));
        assert!(has_error_observation);
    }
}
