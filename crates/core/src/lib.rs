//! Core library for the health data sonification engine.
//!
//! Raw readings are bucketed by the [`aggregate`] module, turned into tone
//! events by [`mapping`], and played back through a single shared audio
//! output by the [`timeline`] scheduler. [`explore`] handles pointer-driven
//! exploration and [`mode`] decides which output channels are live for the
//! user's accessibility mode.

pub mod aggregate;
pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod explore;
pub mod mapping;
pub mod mode;
pub mod narration;
pub mod synth;
pub mod timeline;
pub mod types;

pub use aggregate::{aggregate, aggregate_range, Strategy};
pub use analysis::{ToneAnalyzer, ToneReport};
pub use audio::{AudioEngine, AudioOutput, UnavailableOutput, VoiceId};
pub use config::{AppConfig, AudioConfig, ExploreConfig, MappingConfig};
pub use error::{Result, SonifyError};
pub use explore::{
    Cue, Direction, ExplorationCursor, ExploreOptions, HapticIntensity, SummaryReport,
    TouchExplorer,
};
pub use mapping::{
    map_to_events, sequence_duration, AudioMapper, CategoryMapping, EnvelopeShape, PlaybackSpeed,
    SonificationEvent, ValueRange, Waveform, Wobble,
};
pub use mode::{resolve_active_channels, AccessibilityMode, ChannelSet, ChannelSettings};
pub use synth::{Mixer, MixerOutput, Voice};
pub use timeline::{FrameRequest, PlaybackClock, PlaybackScheduler, SessionHandle, SessionState};
pub use types::{Bucket, Category, Reading, Severity, TimeRange};
