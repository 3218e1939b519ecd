//! The VAD counter: the single-valued "speech buffer" whose zero-crossing
//! defines end-of-utterance. The growth/decay formula below is
//! contract-level, not an implementation detail, so it is kept exact
//! rather than "improved".

use serde::{Deserialize, Serialize};

/// Tuning knobs for the VAD counter, mirroring the configuration surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub max_buffer: f64,
    pub initial_buffer: f64,
    pub base_decay: f64,
    pub growth_rate: f64,
    pub long_talk_threshold: f64,
    pub decay_multiplier_rate: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            max_buffer: 2.0,
            initial_buffer: 1.5,
            base_decay: 1.0,
            growth_rate: 2.0,
            long_talk_threshold: 8.0,
            decay_multiplier_rate: 0.5,
        }
    }
}

/// The speech-buffer counter that decides when an utterance has ended.
///
/// Invariant: `0 <= counter <= config.max_buffer` at all times. Recording
/// ends in the exact frame the counter first reaches zero or below.
#[derive(Debug, Clone)]
pub struct VadCounter {
    config: VadConfig,
    frame_secs: f64,
    counter: f64,
    session_secs: f64,
    is_recording: bool,
    speech_detected: bool,
}

impl VadCounter {
    pub fn new(config: VadConfig, frame_duration_ms: u64) -> Self {
        Self {
            config,
            frame_secs: frame_duration_ms as f64 / 1000.0,
            counter: 0.0,
            session_secs: 0.0,
            is_recording: false,
            speech_detected: false,
        }
    }

    /// Resets the counter for a new listening session: seeds the buffer to
    /// `initial_buffer`, zeroes the session clock, and arms recording.
    pub fn reset(&mut self) {
        self.counter = self.config.initial_buffer;
        self.session_secs = 0.0;
        self.is_recording = true;
        self.speech_detected = false;
    }

    /// Feeds one frame's speech/silence verdict into the counter.
    ///
    /// Returns `true` when the recording should end this frame (either the
    /// counter crossed zero, or the counter was not armed at all).
    pub fn process(&mut self, is_speaking: bool) -> bool {
        if !self.is_recording {
            return true;
        }

        self.session_secs += self.frame_secs;

        if is_speaking {
            self.speech_detected = true;
            self.counter = (self.counter + self.frame_secs * self.config.growth_rate)
                .min(self.config.max_buffer);
        } else {
            let time_over_threshold =
                (self.session_secs - self.config.long_talk_threshold).max(0.0);
            let multiplier = 1.0 + time_over_threshold * self.config.decay_multiplier_rate;
            self.counter -= self.frame_secs * self.config.base_decay * multiplier;
        }

        if self.counter <= 0.0 {
            self.is_recording = false;
            return true;
        }
        false
    }

    /// Forces recording to stop immediately (push-to-talk release, or a
    /// hard external timeout).
    pub fn force_stop(&mut self) {
        self.is_recording = false;
        self.counter = 0.0;
    }

    pub fn counter(&self) -> f64 {
        self.counter
    }

    pub fn session_secs(&self) -> f64 {
        self.session_secs
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn speech_detected(&self) -> bool {
        self.speech_detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(cfg: VadConfig) -> VadCounter {
        let mut c = VadCounter::new(cfg, 30);
        c.reset();
        c
    }

    #[test]
    fn counter_stays_within_bounds() {
        let cfg = VadConfig::default();
        let mut c = counter(cfg);
        for _ in 0..200 {
            let ended = c.process(true);
            assert!(c.counter() >= 0.0 && c.counter() <= cfg.max_buffer);
            if ended {
                break;
            }
        }
    }

    #[test]
    fn silence_only_ends_recording_eventually() {
        let cfg = VadConfig::default();
        let mut c = counter(cfg);
        let mut ended = false;
        for _ in 0..500 {
            if c.process(false) {
                ended = true;
                break;
            }
        }
        assert!(ended, "counter should cross zero under sustained silence");
        assert!(!c.is_recording());
    }

    #[test]
    fn sustained_speech_saturates_at_max_buffer() {
        let cfg = VadConfig::default();
        let mut c = counter(cfg);
        for _ in 0..100 {
            c.process(true);
        }
        assert_eq!(c.counter(), cfg.max_buffer);
    }

    #[test]
    fn force_stop_zeroes_and_disarms() {
        let cfg = VadConfig::default();
        let mut c = counter(cfg);
        c.process(true);
        c.force_stop();
        assert_eq!(c.counter(), 0.0);
        assert!(!c.is_recording());
        // once stopped, process() reports "ended" without touching state again
        assert!(c.process(true));
    }

    #[test]
    fn long_talk_threshold_increases_decay_rate() {
        // with long_talk_threshold effectively zero, every silence frame
        // decays with an ever-growing multiplier
        let cfg = VadConfig {
            long_talk_threshold: 0.0,
            ..VadConfig::default()
        };
        let mut c = counter(cfg);
        c.process(true); // build up some buffer
        let after_one_silence = {
            c.process(false);
            c.counter()
        };
        let after_two_silence = {
            c.process(false);
            c.counter()
        };
        let drop1 = cfg.initial_buffer + cfg.growth_rate * 0.03 - after_one_silence;
        let drop2 = after_one_silence - after_two_silence;
        assert!(
            drop2 > drop1,
            "decay multiplier should grow once past long_talk_threshold: drop1={drop1} drop2={drop2}"
        );
    }

    #[test]
    fn zero_crossing_matches_scenario_s6_shape() {
        // initial_buffer=1.5, growth_rate=2.0, base_decay=1.0, max_buffer=2.0
        let cfg = VadConfig::default();
        let mut c = counter(cfg);
        let mut speech_frames = 0;
        for _ in 0..20 {
            c.process(true);
            speech_frames += 1;
            if c.counter() >= cfg.max_buffer {
                break;
            }
        }
        // counter should saturate well within the 20 speech frames given
        assert!(speech_frames <= 20);
        assert_eq!(c.counter(), cfg.max_buffer);

        let mut silence_frames = 0;
        let mut ended = false;
        for _ in 0..200 {
            silence_frames += 1;
            if c.process(false) {
                ended = true;
                break;
            }
        }
        assert!(ended);
        // counter must not go negative past the ending frame
        assert!(c.counter() <= 0.0);
        assert!(silence_frames > 0);
    }
}
