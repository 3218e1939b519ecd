//! Configuration surface consumed by the core. Loading these from disk
//! (TOML/YAML/env) is an external collaborator's job; the core only ever
//! sees already-parsed structs with sane defaults.

use crate::vad::VadConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_length_ms: u32,
    pub lookback_frames: usize,
    pub max_recording_duration_secs: u64,
    pub processing_timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_length_ms: 30,
            lookback_frames: 100,
            max_recording_duration_secs: 30,
            processing_timeout_secs: 15,
        }
    }
}

impl AudioConfig {
    pub fn frame_len_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_length_ms as usize) / 1000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    pub path: String,
    pub skill_expiry_seconds: i64,
    pub sandbox_enabled: bool,
    pub sandbox_timeout_seconds: f64,
    pub sandbox_memory_limit_mb: u32,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            path: "./skills".to_string(),
            skill_expiry_seconds: 120,
            sandbox_enabled: true,
            sandbox_timeout_seconds: 5.0,
            sandbox_memory_limit_mb: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub agent_max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_max_iterations: 5,
        }
    }
}

impl AgentConfig {
    /// Clamps a configured value into the documented `1..=50` range.
    pub fn clamped_max_iterations(&self) -> u32 {
        self.agent_max_iterations.clamp(1, 50)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub skill_request_timeout_secs: u64,
    /// Inline the skill catalog into the system prompt when the function
    /// count is at or below this threshold; above it, direct the model to
    /// `search_skills` instead.
    pub prompt_embed_threshold: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            skill_request_timeout_secs: 30,
            prompt_embed_threshold: 40,
        }
    }
}

/// The full configuration surface, aggregated for convenience.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub skills: SkillsConfig,
    pub agent: AgentConfig,
    pub hub: HubConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let audio = AudioConfig::default();
        assert_eq!(audio.sample_rate, 16_000);
        assert_eq!(audio.frame_len_samples(), 480);

        let vad = VadConfig::default();
        assert_eq!(vad.max_buffer, 2.0);
        assert_eq!(vad.initial_buffer, 1.5);

        let agent = AgentConfig::default();
        assert_eq!(agent.agent_max_iterations, 5);
    }

    #[test]
    fn agent_iterations_clamped_to_documented_range() {
        let agent = AgentConfig {
            agent_max_iterations: 0,
        };
        assert_eq!(agent.clamped_max_iterations(), 1);
        let agent = AgentConfig {
            agent_max_iterations: 999,
        };
        assert_eq!(agent.clamped_max_iterations(), 50);
    }
}
