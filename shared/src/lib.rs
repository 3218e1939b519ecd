//! Shared data model and wire protocols for the Hub/Spoke voice platform.
//!
//! Both binaries depend on this crate so that the normalization algorithm,
//! the VAD counter, the sandbox wire protocol and the Hub<->Spoke WebSocket
//! protocol are defined exactly once and cannot drift between the two
//! processes that must agree on them bit-for-bit.

pub mod audio;
pub mod config;
pub mod error;
pub mod normalize;
pub mod protocol;
pub mod sandbox;
pub mod sanitize;
pub mod search;
pub mod skill;
pub mod vad;

pub use error::CoreError;
