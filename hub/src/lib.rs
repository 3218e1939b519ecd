//! The Hub: the always-on aggregation point multiple Spokes connect to.
//! Persists devices, skills, sessions and chat history in SQLite, holds one
//! WebSocket connection per live Spoke, and runs an LLM-driven agent loop
//! per chat session that can call local discovery helpers or reach across
//! the network to a connected Spoke's skills.

pub mod agent;
pub mod connection;
pub mod logging;
pub mod sandbox;
pub mod skills;
pub mod store;
