use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{mode::PlaybackChannel, AudioMapper, Result, SonifyError};

/// Top-level configuration structure for the engine.
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub mapping: MappingConfig,
    pub explore: ExploreConfig,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(SonifyError::invalid("audio.sample_rate must be positive"));
        }
        if self.audio.render_block == 0 {
            return Err(SonifyError::invalid("audio.render_block must be positive"));
        }
        if !(0.0..=1.0).contains(&self.audio.master_volume) {
            return Err(SonifyError::invalid("audio.master_volume must be within [0, 1]"));
        }
        if self.mapping.inter_event_gap_ms == 0 {
            return Err(SonifyError::invalid("mapping.inter_event_gap_ms must be positive"));
        }
        if self.explore.simplified_stops == 0 {
            return Err(SonifyError::invalid("explore.simplified_stops must be positive"));
        }
        if !(0.0..1.0).contains(&self.explore.stable_fraction) {
            return Err(SonifyError::invalid("explore.stable_fraction must be within [0, 1)"));
        }
        Ok(())
    }

    /// Mapper for whole-series playback on an enabled playback channel.
    pub fn mapper(&self, playback: &PlaybackChannel) -> AudioMapper {
        AudioMapper::new(self.mapping.inter_event_gap())
            .with_gain(self.audio.master_volume * playback.volume)
            .with_rhythm(playback.rhythmic)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub attack_ms: u64,
    /// How far ahead of the audio clock a session's first event is placed.
    pub schedule_lead_ms: u64,
    pub master_volume: f64,
    /// Frames rendered per offline block; one block is one progress frame.
    pub render_block: usize,
}

impl AudioConfig {
    pub fn attack(&self) -> Duration {
        Duration::from_millis(self.attack_ms)
    }

    pub fn schedule_lead(&self) -> Duration {
        Duration::from_millis(self.schedule_lead_ms)
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            attack_ms: 10,
            schedule_lead_ms: 50,
            master_volume: 0.8,
            render_block: 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub inter_event_gap_ms: u64,
}

impl MappingConfig {
    pub fn inter_event_gap(&self) -> Duration {
        Duration::from_millis(self.inter_event_gap_ms)
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            inter_event_gap_ms: 200,
        }
    }
}

/// Touch exploration tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    pub cue_duration_ms: u64,
    /// Number of distinct cue stops across the chart in simplified mode.
    pub simplified_stops: usize,
    /// First-to-last change, as a fraction of the series span, below which
    /// an exploration reads as stable.
    pub stable_fraction: f64,
}

impl ExploreConfig {
    pub fn cue_duration(&self) -> Duration {
        Duration::from_millis(self.cue_duration_ms)
    }
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            cue_duration_ms: 60,
            simplified_stops: 8,
            stable_fraction: 0.05,
        }
    }
}
