//! The persistence interface the core consumes. The core never touches
//! SQL directly - it calls through `HubStore`, whose only production
//! implementation (`sqlite::SqliteStore`) is grounded in the teacher pack's
//! `rusqlite` usage (see `sqlite.rs`). Keeping the trait narrow to the query
//! shapes the agent loop and connection manager actually need (fetch live
//! skills for a user, upsert a connection's last-seen, append a chat
//! message) means a test double can stand in without a database.

pub mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use shared::skill::Skill;

#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub user_id: String,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub device_id: String,
    pub user_id: String,
    pub title: String,
    pub message_count: u64,
    pub last_mode_prompt: Option<String>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub session_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The query shapes the Hub core needs from persistence. Implementations
/// must be safe to call from multiple tasks concurrently.
#[async_trait::async_trait]
pub trait HubStore: Send + Sync {
    async fn upsert_device(&self, id: &str, name: &str, user_id: &str) -> Result<(), String>;
    async fn set_device_active(&self, id: &str, active: bool) -> Result<(), String>;
    async fn touch_device_last_seen(&self, id: &str) -> Result<(), String>;
    async fn devices_for_user(&self, user_id: &str) -> Result<Vec<DeviceRecord>, String>;

    async fn upsert_skill(&self, skill: &Skill) -> Result<(), String>;
    async fn remove_device_skills(&self, device_id: &str) -> Result<(), String>;
    /// Live skills for every device belonging to `user_id`, joined with the
    /// owning device's name. The aggregate search in `crate::skills` filters
    /// these further by connection state and heartbeat expiry.
    async fn skills_for_user(&self, user_id: &str) -> Result<Vec<Skill>, String>;

    async fn create_session(&self, id: &str, device_id: &str, user_id: &str, title: &str) -> Result<(), String>;
    async fn session(&self, id: &str) -> Result<Option<SessionRecord>, String>;
    async fn append_message(&self, session_id: &str, role: &str, content: &str) -> Result<(), String>;
    async fn session_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, String>;
    async fn set_last_mode_prompt(&self, session_id: &str, mode: &str) -> Result<(), String>;
}
