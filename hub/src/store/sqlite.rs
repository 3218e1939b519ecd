//! `rusqlite`-backed implementation of `HubStore`.
//!
//! Grounded in the pack's one concrete `rusqlite` user,
//! `SinergaOptima-Dictum/dictum-app/src/storage.rs`: a connection opened
//! fresh per call against a single file (no pooling library), `PRAGMA
//! journal_mode = WAL`, `execute_batch` for schema setup, and `params!`/
//! `row.get` for everything else. Unlike that desktop app, every call here
//! runs inside `spawn_blocking` since the Hub is a long-lived async server
//! and must never stall the reactor on disk I/O.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection};

use shared::skill::Skill;

use super::{DeviceRecord, HubStore, MessageRecord, SessionRecord};

#[derive(Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, String> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, String> {
        Connection::open(&self.db_path).map_err(|e| e.to_string())
    }

    fn init_schema(&self) -> Result<(), String> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS devices (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL,
              user_id TEXT NOT NULL,
              is_active INTEGER NOT NULL DEFAULT 0,
              last_seen INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS skills (
              device_id TEXT NOT NULL,
              class_name TEXT NOT NULL,
              method_name TEXT NOT NULL,
              signature TEXT NOT NULL,
              docstring TEXT,
              last_heartbeat INTEGER NOT NULL,
              PRIMARY KEY (device_id, class_name, method_name)
            );

            CREATE TABLE IF NOT EXISTS sessions (
              id TEXT PRIMARY KEY,
              device_id TEXT NOT NULL,
              user_id TEXT NOT NULL,
              title TEXT NOT NULL,
              message_count INTEGER NOT NULL DEFAULT 0,
              last_mode_prompt TEXT,
              last_activity INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
              session_id TEXT NOT NULL,
              role TEXT NOT NULL,
              content TEXT NOT NULL,
              created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_skills_device ON skills(device_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);
            "#,
        )
        .map_err(|e| e.to_string())?;
        Ok(())
    }
}

fn ts(seconds: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_else(Utc::now)
}

#[async_trait::async_trait]
impl HubStore for SqliteStore {
    async fn upsert_device(&self, id: &str, name: &str, user_id: &str) -> Result<(), String> {
        let store = self.clone();
        let id = id.to_string();
        let name = name.to_string();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            let now = Utc::now().timestamp();
            conn.execute(
                r#"
                INSERT INTO devices (id, name, user_id, is_active, last_seen)
                VALUES (?1, ?2, ?3, 1, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    user_id = excluded.user_id,
                    is_active = 1,
                    last_seen = excluded.last_seen
                "#,
                params![id, name, user_id, now],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn set_device_active(&self, id: &str, active: bool) -> Result<(), String> {
        let store = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            conn.execute(
                "UPDATE devices SET is_active = ?2 WHERE id = ?1",
                params![id, active as i64],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn touch_device_last_seen(&self, id: &str) -> Result<(), String> {
        let store = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            conn.execute(
                "UPDATE devices SET last_seen = ?2 WHERE id = ?1",
                params![id, Utc::now().timestamp()],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn devices_for_user(&self, user_id: &str) -> Result<Vec<DeviceRecord>, String> {
        let store = self.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            let mut stmt = conn
                .prepare("SELECT id, name, user_id, is_active, last_seen FROM devices WHERE user_id = ?1")
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok(DeviceRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        user_id: row.get(2)?,
                        is_active: row.get::<_, i64>(3)? != 0,
                        last_seen: ts(row.get(4)?),
                    })
                })
                .map_err(|e| e.to_string())?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn upsert_skill(&self, skill: &Skill) -> Result<(), String> {
        let store = self.clone();
        let skill = skill.clone();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            conn.execute(
                r#"
                INSERT INTO skills (device_id, class_name, method_name, signature, docstring, last_heartbeat)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(device_id, class_name, method_name) DO UPDATE SET
                    signature = excluded.signature,
                    docstring = excluded.docstring,
                    last_heartbeat = excluded.last_heartbeat
                "#,
                params![
                    skill.device_id,
                    skill.class_name,
                    skill.method_name,
                    skill.signature,
                    skill.docstring,
                    skill.last_heartbeat.timestamp(),
                ],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn remove_device_skills(&self, device_id: &str) -> Result<(), String> {
        let store = self.clone();
        let device_id = device_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            conn.execute("DELETE FROM skills WHERE device_id = ?1", params![device_id])
                .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn skills_for_user(&self, user_id: &str) -> Result<Vec<Skill>, String> {
        let store = self.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT s.device_id, s.class_name, s.method_name, s.signature, s.docstring, s.last_heartbeat
                    FROM skills s
                    JOIN devices d ON d.id = s.device_id
                    WHERE d.user_id = ?1
                    "#,
                )
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok(Skill {
                        device_id: row.get(0)?,
                        class_name: row.get(1)?,
                        method_name: row.get(2)?,
                        signature: row.get(3)?,
                        docstring: row.get(4)?,
                        last_heartbeat: ts(row.get(5)?),
                    })
                })
                .map_err(|e| e.to_string())?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn create_session(&self, id: &str, device_id: &str, user_id: &str, title: &str) -> Result<(), String> {
        let store = self.clone();
        let (id, device_id, user_id, title) =
            (id.to_string(), device_id.to_string(), user_id.to_string(), title.to_string());
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            conn.execute(
                r#"
                INSERT INTO sessions (id, device_id, user_id, title, message_count, last_mode_prompt, last_activity)
                VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5)
                ON CONFLICT(id) DO NOTHING
                "#,
                params![id, device_id, user_id, title, Utc::now().timestamp()],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn session(&self, id: &str) -> Result<Option<SessionRecord>, String> {
        let store = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, device_id, user_id, title, message_count, last_mode_prompt, last_activity
                     FROM sessions WHERE id = ?1",
                )
                .map_err(|e| e.to_string())?;
            let mut rows = stmt.query(params![id]).map_err(|e| e.to_string())?;
            let Some(row) = rows.next().map_err(|e| e.to_string())? else {
                return Ok(None);
            };
            Ok(Some(SessionRecord {
                id: row.get(0).map_err(|e| e.to_string())?,
                device_id: row.get(1).map_err(|e| e.to_string())?,
                user_id: row.get(2).map_err(|e| e.to_string())?,
                title: row.get(3).map_err(|e| e.to_string())?,
                message_count: row.get::<_, i64>(4).map_err(|e| e.to_string())? as u64,
                last_mode_prompt: row.get(5).map_err(|e| e.to_string())?,
                last_activity: ts(row.get(6).map_err(|e| e.to_string())?),
            }))
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn append_message(&self, session_id: &str, role: &str, content: &str) -> Result<(), String> {
        let store = self.clone();
        let (session_id, role, content) = (session_id.to_string(), role.to_string(), content.to_string());
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            let now = Utc::now().timestamp();
            conn.execute(
                "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role, content, now],
            )
            .map_err(|e| e.to_string())?;
            conn.execute(
                "UPDATE sessions SET message_count = message_count + 1, last_activity = ?2 WHERE id = ?1",
                params![session_id, now],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn session_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, String> {
        let store = self.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            let mut stmt = conn
                .prepare(
                    "SELECT session_id, role, content, created_at FROM messages
                     WHERE session_id = ?1 ORDER BY created_at ASC",
                )
                .map_err(|e| e.to_string())?;
            let rows = stmt
                .query_map(params![session_id], |row| {
                    Ok(MessageRecord {
                        session_id: row.get(0)?,
                        role: row.get(1)?,
                        content: row.get(2)?,
                        created_at: ts(row.get(3)?),
                    })
                })
                .map_err(|e| e.to_string())?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }

    async fn set_last_mode_prompt(&self, session_id: &str, mode: &str) -> Result<(), String> {
        let store = self.clone();
        let (session_id, mode) = (session_id.to_string(), mode.to_string());
        tokio::task::spawn_blocking(move || {
            let conn = store.connect()?;
            conn.execute(
                "UPDATE sessions SET last_mode_prompt = ?2 WHERE id = ?1",
                params![session_id, mode],
            )
            .map_err(|e| e.to_string())?;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn temp_store() -> SqliteStore {
        let dir = tempfile::tempdir().unwrap();
        SqliteStore::open(dir.path().join("hub.db")).unwrap()
    }

    #[tokio::test]
    async fn device_upsert_then_fetch_by_user() {
        let store = temp_store();
        store.upsert_device("dev1", "Kitchen", "user1").await.unwrap();
        let devices = store.devices_for_user("user1").await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Kitchen");
        assert!(devices[0].is_active);
    }

    #[tokio::test]
    async fn skill_upsert_joins_through_owning_device() {
        let store = temp_store();
        store.upsert_device("dev1", "Kitchen", "user1").await.unwrap();
        store
            .upsert_skill(&Skill {
                device_id: "dev1".into(),
                class_name: "LightSkill".into(),
                method_name: "turn_on".into(),
                signature: "turn_on()".into(),
                docstring: None,
                last_heartbeat: Utc::now(),
            })
            .await
            .unwrap();
        let skills = store.skills_for_user("user1").await.unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].class_name, "LightSkill");
    }

    #[tokio::test]
    async fn messages_append_and_bump_session_count() {
        let store = temp_store();
        store.upsert_device("dev1", "Kitchen", "user1").await.unwrap();
        store.create_session("sess1", "dev1", "user1", "chat").await.unwrap();
        store.append_message("sess1", "user", "hi").await.unwrap();
        store.append_message("sess1", "assistant", "hello").await.unwrap();

        let messages = store.session_messages("sess1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");

        let session = store.session("sess1").await.unwrap().unwrap();
        assert_eq!(session.message_count, 2);
    }

    #[tokio::test]
    async fn last_mode_prompt_tracks_most_recent_mode() {
        let store = temp_store();
        store.upsert_device("dev1", "Kitchen", "user1").await.unwrap();
        store.create_session("sess1", "dev1", "user1", "chat").await.unwrap();
        store.set_last_mode_prompt("sess1", "hub").await.unwrap();
        let session = store.session("sess1").await.unwrap().unwrap();
        assert_eq!(session.last_mode_prompt.as_deref(), Some("hub"));
    }
}
