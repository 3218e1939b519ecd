//! Voice event stream emitted by the state machine, consumed by any UI.
//! Every event carries `{ type, data?, timestamp }` on the wire; the
//! `VoiceEvent` enum is the typed in-process form, serialized at the edge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state_machine::VoiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum VoiceEventKind {
    StateChanged { old: VoiceState, new: VoiceState },
    WakeDetected { keyword: String },
    RecordingStarted,
    RecordingStopped,
    VadSpeechEnd,
    TranscriptionComplete { text: String, confidence: f32 },
    ResponseText { text: String },
    TtsStarted { text: String },
    TtsChunk,
    TtsComplete,
    Error { stage: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceEvent {
    #[serde(flatten)]
    pub kind: VoiceEventKind,
    pub timestamp: DateTime<Utc>,
}

impl VoiceEvent {
    pub fn new(kind: VoiceEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = VoiceEvent::new(VoiceEventKind::WakeDetected {
            keyword: "hey assistant".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "wake-detected");
        assert_eq!(json["keyword"], "hey assistant");
        assert!(json.get("timestamp").is_some());
    }
}
