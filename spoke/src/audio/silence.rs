//! A `CaptureDevice` that yields silence at the configured frame rate.
//! Used when no real audio backend is wired up: keeps the fanout and
//! pipeline exercised without a microphone.

use std::thread::sleep;
use std::time::Duration;

use shared::audio::AudioFrame;
use shared::CoreError;

use super::fanout::CaptureDevice;

pub struct SilenceCaptureDevice {
    frame_len_samples: usize,
    frame_duration: Duration,
}

impl SilenceCaptureDevice {
    pub fn new(frame_len_samples: usize, frame_duration_ms: u32) -> Self {
        Self {
            frame_len_samples,
            frame_duration: Duration::from_millis(frame_duration_ms as u64),
        }
    }
}

impl CaptureDevice for SilenceCaptureDevice {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, CoreError> {
        sleep(self.frame_duration);
        Ok(Some(AudioFrame::silence(self.frame_len_samples)))
    }
}
