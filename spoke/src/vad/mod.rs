//! The pluggable voice-activity-detection backend trait. Concrete ML-backed
//! detectors (WebRTC VAD, Silero) are external collaborators; this module
//! defines the trait boundary and a trivial always-available RMS backend
//! used by tests and as a graceful-degradation fallback.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VadError {
    #[error("VAD model not loaded")]
    ModelNotLoaded,
    #[error("invalid audio input: {0}")]
    InvalidAudio(String),
    #[error("VAD inference failed: {0}")]
    InferenceFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadResult {
    pub is_speech: bool,
    pub confidence: f32,
}

#[async_trait]
pub trait VoiceActivityDetection: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn is_initialized(&self) -> bool;
    async fn initialize(&mut self) -> Result<(), VadError>;
    async fn detect(&self, samples: &[i16]) -> Result<VadResult, VadError>;
}

/// A trivial, always-available energy-threshold backend. Good enough for
/// local-only development mode and for exercising the pipeline's state
/// machine/VAD-counter logic in tests without a real model.
pub struct RmsVad {
    threshold: f32,
    initialized: bool,
}

impl RmsVad {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            initialized: false,
        }
    }
}

impl Default for RmsVad {
    fn default() -> Self {
        Self::new(400.0)
    }
}

#[async_trait]
impl VoiceActivityDetection for RmsVad {
    fn name(&self) -> &str {
        "rms"
    }

    fn description(&self) -> &str {
        "energy-threshold VAD, no model required"
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    async fn initialize(&mut self) -> Result<(), VadError> {
        self.initialized = true;
        Ok(())
    }

    async fn detect(&self, samples: &[i16]) -> Result<VadResult, VadError> {
        if !self.initialized {
            return Err(VadError::ModelNotLoaded);
        }
        if samples.is_empty() {
            return Err(VadError::InvalidAudio("empty frame".into()));
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (sum_sq / samples.len() as f64).sqrt() as f32;
        Ok(VadResult {
            is_speech: rms >= self.threshold,
            confidence: (rms / (self.threshold * 2.0)).min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uninitialized_backend_rejects_detect() {
        let vad = RmsVad::new(400.0);
        let err = vad.detect(&[0i16; 10]).await.unwrap_err();
        assert!(matches!(err, VadError::ModelNotLoaded));
    }

    #[tokio::test]
    async fn silence_below_threshold_is_not_speech() {
        let mut vad = RmsVad::new(400.0);
        vad.initialize().await.unwrap();
        let result = vad.detect(&[0i16; 320]).await.unwrap();
        assert!(!result.is_speech);
    }

    #[tokio::test]
    async fn loud_signal_above_threshold_is_speech() {
        let mut vad = RmsVad::new(400.0);
        vad.initialize().await.unwrap();
        let loud = vec![20_000i16; 320];
        let result = vad.detect(&loud).await.unwrap();
        assert!(result.is_speech);
    }

    #[tokio::test]
    async fn empty_frame_is_invalid() {
        let mut vad = RmsVad::new(400.0);
        vad.initialize().await.unwrap();
        let err = vad.detect(&[]).await.unwrap_err();
        assert!(matches!(err, VadError::InvalidAudio(_)));
    }
}
