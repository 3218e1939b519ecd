//! Voice pipeline state machine: wake -> record -> transcribe -> respond ->
//! speak as a strict state graph driven by audio frames and external
//! events. State changes are atomic under a mutex and emit a
//! `state-changed` event; any transition outside the legal table fails
//! with `CoreError::StateTransition`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared::audio::AudioFrame;
use shared::config::AudioConfig;
use shared::error::CoreError;
use shared::vad::VadConfig;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::vad::VoiceActivityDetection;

use super::events::{VoiceEvent, VoiceEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceState {
    Stopped,
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

/// The legal-transition table, checked on every transition.
fn is_legal(from: VoiceState, to: VoiceState) -> bool {
    use VoiceState::*;
    matches!(
        (from, to),
        (Stopped, Idle)
            | (Idle, Listening)
            | (Idle, Stopped)
            | (Listening, Processing)
            | (Listening, Idle)
            | (Listening, Stopped)
            | (Processing, Speaking)
            | (Processing, Idle)
            | (Processing, Error)
            | (Processing, Stopped)
            | (Speaking, Idle)
            | (Speaking, Listening)
            | (Speaking, Stopped)
            | (Error, Stopped)
    )
}

/// Ephemeral, one per voice interaction.
pub struct VoiceSession {
    pub id: Uuid,
    pub is_push_to_talk: bool,
    pub lookback: Vec<i16>,
    pub recording: Vec<i16>,
}

impl VoiceSession {
    fn new(is_push_to_talk: bool, lookback: Vec<i16>) -> Self {
        Self {
            id: Uuid::new_v4(),
            is_push_to_talk,
            lookback,
            recording: Vec::new(),
        }
    }
}

struct Guarded {
    state: VoiceState,
    session: Option<VoiceSession>,
}

pub struct VoicePipeline {
    inner: Mutex<Guarded>,
    events: broadcast::Sender<VoiceEvent>,
    audio_config: AudioConfig,
    vad_config: VadConfig,
    interrupts_enabled: bool,
}

impl VoicePipeline {
    pub fn new(audio_config: AudioConfig, vad_config: VadConfig, interrupts_enabled: bool) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Guarded {
                state: VoiceState::Stopped,
                session: None,
            }),
            events: tx,
            audio_config,
            vad_config,
            interrupts_enabled,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> VoiceState {
        self.inner.lock().state
    }

    fn emit(&self, kind: VoiceEventKind) {
        // A lagged/closed receiver is not an error for the producer: events
        // are best-effort for observers, never load-bearing for control flow.
        let _ = self.events.send(VoiceEvent::new(kind));
    }

    /// Validates and performs a state transition, emitting `state-changed`.
    fn transition(&self, to: VoiceState) -> Result<(), CoreError> {
        let from = {
            let mut guard = self.inner.lock();
            let from = guard.state;
            if !is_legal(from, to) {
                return Err(CoreError::StateTransition {
                    from: format!("{from:?}"),
                    to: format!("{to:?}"),
                });
            }
            guard.state = to;
            from
        };
        self.emit(VoiceEventKind::StateChanged { old: from, new: to });
        Ok(())
    }

    pub fn start(&self) -> Result<(), CoreError> {
        self.transition(VoiceState::Idle)
    }

    pub fn shutdown(&self) -> Result<(), CoreError> {
        let current = self.state();
        if current == VoiceState::Stopped {
            return Ok(());
        }
        self.transition(VoiceState::Stopped)
    }

    /// Wake-word path: `Idle -> Listening`. Also serves barge-in:
    /// `Speaking -> Listening` if interrupts are enabled.
    pub fn wake_detected(&self, keyword: &str, lookback: Vec<i16>) -> Result<(), CoreError> {
        let current = self.state();
        if current == VoiceState::Speaking && !self.interrupts_enabled {
            // Barge-in disabled: wake word during TTS playback is ignored,
            // not an error, this is the documented opt-in boundary.
            return Ok(());
        }
        self.begin_listening(false, lookback)?;
        self.emit(VoiceEventKind::WakeDetected {
            keyword: keyword.to_string(),
        });
        Ok(())
    }

    /// Push-to-talk path: bypasses wake detection entirely.
    pub fn start_recording_ptt(&self, lookback: Vec<i16>) -> Result<(), CoreError> {
        self.begin_listening(true, lookback)
    }

    fn begin_listening(&self, is_ptt: bool, lookback: Vec<i16>) -> Result<(), CoreError> {
        self.transition(VoiceState::Listening)?;
        let mut guard = self.inner.lock();
        guard.session = Some(VoiceSession::new(is_ptt, lookback));
        drop(guard);
        self.emit(VoiceEventKind::RecordingStarted);
        Ok(())
    }

    /// Feeds one frame into the active recording session and the supplied
    /// VAD counter. Returns `true` if the session ended this frame (VAD
    /// speech-end, session-duration timeout, or PTT release already
    /// applied via `force_stop`).
    pub async fn feed_frame(
        &self,
        frame: &AudioFrame,
        vad: &dyn VoiceActivityDetection,
        vad_counter: &mut shared::vad::VadCounter,
    ) -> Result<bool, CoreError> {
        if self.state() != VoiceState::Listening {
            return Ok(false);
        }

        {
            let mut guard = self.inner.lock();
            if let Some(session) = guard.session.as_mut() {
                session.recording.extend_from_slice(&frame.samples);
            }
        }

        let detect_result = vad
            .detect(&frame.samples)
            .await
            .map_err(|e| CoreError::CaptureFailure(e.to_string()))?;

        let ended = vad_counter.process(detect_result.is_speech);
        let timed_out = vad_counter.session_secs()
            >= self.audio_config.max_recording_duration_secs as f64;

        if ended || timed_out {
            self.emit(VoiceEventKind::VadSpeechEnd);
            self.emit(VoiceEventKind::RecordingStopped);
            self.transition(VoiceState::Processing)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// PTT release: forces the session to Processing regardless of VAD state.
    pub fn stop_recording_ptt(&self, vad_counter: &mut shared::vad::VadCounter) -> Result<(), CoreError> {
        vad_counter.force_stop();
        self.emit(VoiceEventKind::RecordingStopped);
        self.transition(VoiceState::Processing)
    }

    /// Runs the Processing stage under a watchdog bounded by
    /// `processing_timeout`. `work` performs STT + the response handler and
    /// returns `Some(response_text)` or `None` for an empty response.
    pub async fn run_processing<F, Fut>(&self, work: F) -> Result<(), CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<String>, CoreError>>,
    {
        if self.state() != VoiceState::Processing {
            return Err(CoreError::StateTransition {
                from: format!("{:?}", self.state()),
                to: "Processing".into(),
            });
        }

        let bound = Duration::from_secs(self.audio_config.processing_timeout_secs);
        match timeout(bound, work()).await {
            Ok(Ok(Some(response_text))) => {
                self.emit(VoiceEventKind::ResponseText {
                    text: response_text,
                });
                self.transition(VoiceState::Speaking)
            }
            Ok(Ok(None)) => self.transition(VoiceState::Idle),
            Ok(Err(e)) => {
                warn!(error = %e, "processing stage failed");
                self.emit(VoiceEventKind::Error {
                    stage: "processing".into(),
                    message: e.to_string(),
                });
                self.transition(VoiceState::Error)?;
                // terminal recovery: the caller must re-invoke `start()` to
                // bring the pipeline back to Idle, matching the documented
                // Error -> Stopped contract
                self.transition(VoiceState::Stopped)
            }
            Err(_elapsed) => {
                info!("processing watchdog fired, forcing back to Idle");
                self.emit(VoiceEventKind::Error {
                    stage: "processing".into(),
                    message: "processing timeout".into(),
                });
                self.transition(VoiceState::Idle)
            }
        }
    }

    pub fn start_speaking(&self, text: &str) {
        self.emit(VoiceEventKind::TtsStarted {
            text: text.to_string(),
        });
    }

    pub fn tts_chunk(&self) {
        self.emit(VoiceEventKind::TtsChunk);
    }

    /// TTS finished normally: `Speaking -> Idle`.
    pub fn finish_speaking(&self) -> Result<(), CoreError> {
        self.emit(VoiceEventKind::TtsComplete);
        self.transition(VoiceState::Idle)
    }

    pub fn current_session_recording(&self) -> Vec<i16> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.recording.clone())
            .unwrap_or_default()
    }
}
