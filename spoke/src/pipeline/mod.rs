pub mod events;
pub mod state_machine;

pub use events::{VoiceEvent, VoiceEventKind};
pub use state_machine::{VoicePipeline, VoiceSession, VoiceState};
