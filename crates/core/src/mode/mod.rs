//! Channel selection per accessibility mode.
//!
//! [`resolve_active_channels`] is the single place that decides which
//! outputs run; consumers receive a [`ChannelSet`] and never branch on the
//! mode themselves.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Result, SonifyError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessibilityMode {
    Visual,
    Audio,
    #[default]
    Hybrid,
    Simplified,
}

impl FromStr for AccessibilityMode {
    type Err = SonifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visual" => Ok(AccessibilityMode::Visual),
            "audio" => Ok(AccessibilityMode::Audio),
            "hybrid" => Ok(AccessibilityMode::Hybrid),
            "simplified" => Ok(AccessibilityMode::Simplified),
            other => Err(SonifyError::invalid(format!(
                "unknown accessibility mode `{other}`"
            ))),
        }
    }
}

/// User toggles that apply on top of the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub audio_enabled: bool,
    pub haptics_enabled: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            haptics_enabled: true,
        }
    }
}

/// How finely touch exploration emits cues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueGranularity {
    /// One cue per bucket.
    #[default]
    Fine,
    /// Buckets grouped into a handful of stops.
    Coarse,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackChannel {
    pub volume: f64,
    /// Pulse embellishment for rhythmic categories.
    pub rhythmic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CueChannel {
    pub volume: f64,
}

/// Outputs enabled for the current mode; `None` means disabled.
///
/// Haptic pulses always carry the full three-level severity scale; modes
/// only change how often exploration cues fire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelSet {
    pub visual: bool,
    pub playback: Option<PlaybackChannel>,
    pub audio_cues: Option<CueChannel>,
    pub haptics: bool,
    /// Spacing of exploration cues, shared by the audio and haptic channels.
    pub granularity: CueGranularity,
}

impl ChannelSet {
    /// True when any channel produces sound.
    pub fn any_audio(&self) -> bool {
        self.playback.is_some() || self.audio_cues.is_some()
    }

    /// True when touch exploration has something to emit.
    pub fn explores(&self) -> bool {
        self.audio_cues.is_some() || self.haptics
    }
}

/// Decides which channels run for `mode` under the user's `settings`.
pub fn resolve_active_channels(mode: AccessibilityMode, settings: ChannelSettings) -> ChannelSet {
    let audio = settings.audio_enabled;
    let haptics = settings.haptics_enabled;

    let (playback, audio_cues, granularity) = match mode {
        AccessibilityMode::Visual => (None, None, CueGranularity::Fine),
        AccessibilityMode::Audio => (
            Some(PlaybackChannel {
                volume: 1.0,
                rhythmic: true,
            }),
            Some(CueChannel { volume: 1.0 }),
            CueGranularity::Fine,
        ),
        AccessibilityMode::Hybrid => (
            Some(PlaybackChannel {
                volume: 0.7,
                rhythmic: true,
            }),
            Some(CueChannel { volume: 0.6 }),
            CueGranularity::Fine,
        ),
        AccessibilityMode::Simplified => (
            Some(PlaybackChannel {
                volume: 0.8,
                rhythmic: false,
            }),
            Some(CueChannel { volume: 0.8 }),
            CueGranularity::Coarse,
        ),
    };

    ChannelSet {
        visual: true,
        playback: playback.filter(|_| audio),
        audio_cues: audio_cues.filter(|_| audio),
        haptics,
        granularity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ON: ChannelSettings = ChannelSettings {
        audio_enabled: true,
        haptics_enabled: true,
    };

    #[test]
    fn visual_mode_keeps_only_haptics() {
        let channels = resolve_active_channels(AccessibilityMode::Visual, ALL_ON);

        assert!(channels.visual);
        assert!(channels.playback.is_none());
        assert!(channels.audio_cues.is_none());
        assert!(channels.haptics);

        let no_haptics = resolve_active_channels(
            AccessibilityMode::Visual,
            ChannelSettings {
                audio_enabled: true,
                haptics_enabled: false,
            },
        );
        assert!(!no_haptics.explores());
    }

    #[test]
    fn audio_and_hybrid_follow_toggles() {
        for mode in [AccessibilityMode::Audio, AccessibilityMode::Hybrid] {
            let all = resolve_active_channels(mode, ALL_ON);
            assert!(all.playback.is_some() && all.audio_cues.is_some() && all.haptics);

            let muted = resolve_active_channels(
                mode,
                ChannelSettings {
                    audio_enabled: false,
                    haptics_enabled: true,
                },
            );
            assert!(!muted.any_audio());
            assert!(muted.haptics);

            let still = resolve_active_channels(
                mode,
                ChannelSettings {
                    audio_enabled: true,
                    haptics_enabled: false,
                },
            );
            assert!(still.any_audio());
            assert!(!still.haptics);
        }
    }

    #[test]
    fn simplified_mode_coarsens_cues_and_drops_pulse() {
        let channels = resolve_active_channels(AccessibilityMode::Simplified, ALL_ON);

        assert_eq!(channels.granularity, CueGranularity::Coarse);
        assert!(channels.audio_cues.is_some());
        assert!(channels.haptics);
        assert!(!channels.playback.unwrap().rhythmic);
    }

    #[test]
    fn simplified_granularity_survives_muted_audio() {
        let channels = resolve_active_channels(
            AccessibilityMode::Simplified,
            ChannelSettings {
                audio_enabled: false,
                haptics_enabled: true,
            },
        );

        assert!(!channels.any_audio());
        assert!(channels.explores());
        assert_eq!(channels.granularity, CueGranularity::Coarse);
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!(
            "Simplified".parse::<AccessibilityMode>().unwrap(),
            AccessibilityMode::Simplified
        );
        assert!("braille".parse::<AccessibilityMode>().is_err());
    }
}
