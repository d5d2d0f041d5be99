//! Translation of bucketed values into synthesis events.

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Bucket, Category, Result, Severity, SonifyError};

/// Oscillator shape used to voice an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Sawtooth,
}

/// Gain shaping applied over an event's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeShape {
    /// Sharp attack and fast decay, for discrete counts.
    Percussive,
    /// Gentle attack with a held body and a late release, for continuous signals.
    Sustained,
}

/// Slow periodic frequency modulation that evokes a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wobble {
    pub rate_hz: f64,
    pub depth_hz: f64,
}

/// Static sound design for one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMapping {
    pub waveform: Waveform,
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub envelope: EnvelopeShape,
    /// Event length at normal speed.
    pub event_duration: Duration,
    pub wobble: Option<Wobble>,
}

impl CategoryMapping {
    /// Returns the mapping that voices `category`.
    pub fn for_category(category: Category) -> &'static CategoryMapping {
        match category {
            Category::HeartRate => &HEART_RATE,
            Category::Glucose => &GLUCOSE,
            Category::Steps => &STEPS,
            Category::Sleep => &SLEEP,
            Category::BloodOxygen => &BLOOD_OXYGEN,
            Category::Weight => &WEIGHT,
        }
    }

    /// Frequency for a value already normalised to `[0, 1]`.
    pub fn frequency_at(&self, normalized: f64) -> f64 {
        let t = normalized.clamp(0.0, 1.0);
        self.min_frequency + t * (self.max_frequency - self.min_frequency)
    }
}

static HEART_RATE: CategoryMapping = CategoryMapping {
    waveform: Waveform::Sine,
    min_frequency: 220.0,
    max_frequency: 880.0,
    envelope: EnvelopeShape::Sustained,
    event_duration: Duration::from_millis(180),
    wobble: Some(Wobble {
        rate_hz: 1.2,
        depth_hz: 6.0,
    }),
};

static GLUCOSE: CategoryMapping = CategoryMapping {
    waveform: Waveform::Triangle,
    min_frequency: 200.0,
    max_frequency: 800.0,
    envelope: EnvelopeShape::Sustained,
    event_duration: Duration::from_millis(180),
    wobble: None,
};

static STEPS: CategoryMapping = CategoryMapping {
    waveform: Waveform::Square,
    min_frequency: 300.0,
    max_frequency: 1200.0,
    envelope: EnvelopeShape::Percussive,
    event_duration: Duration::from_millis(90),
    wobble: None,
};

static SLEEP: CategoryMapping = CategoryMapping {
    waveform: Waveform::Sine,
    min_frequency: 110.0,
    max_frequency: 440.0,
    envelope: EnvelopeShape::Sustained,
    event_duration: Duration::from_millis(180),
    wobble: None,
};

static BLOOD_OXYGEN: CategoryMapping = CategoryMapping {
    waveform: Waveform::Sine,
    min_frequency: 330.0,
    max_frequency: 990.0,
    envelope: EnvelopeShape::Sustained,
    event_duration: Duration::from_millis(180),
    wobble: None,
};

static WEIGHT: CategoryMapping = CategoryMapping {
    waveform: Waveform::Triangle,
    min_frequency: 150.0,
    max_frequency: 600.0,
    envelope: EnvelopeShape::Sustained,
    event_duration: Duration::from_millis(180),
    wobble: None,
};

/// User-facing playback speed presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
    VeryFast,
}

impl PlaybackSpeed {
    /// Elapsed-time divisor; larger plays faster.
    pub fn multiplier(&self) -> f64 {
        match self {
            PlaybackSpeed::Slow => 0.5,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::Fast => 1.5,
            PlaybackSpeed::VeryFast => 2.0,
        }
    }
}

impl FromStr for PlaybackSpeed {
    type Err = SonifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "slow" => Ok(PlaybackSpeed::Slow),
            "normal" => Ok(PlaybackSpeed::Normal),
            "fast" => Ok(PlaybackSpeed::Fast),
            "very_fast" | "veryfast" => Ok(PlaybackSpeed::VeryFast),
            other => Err(SonifyError::invalid(format!("unknown playback speed `{other}`"))),
        }
    }
}

/// One scheduled tone, derived from one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SonificationEvent {
    pub frequency: f64,
    pub start_offset: Duration,
    pub event_duration: Duration,
    pub waveform: Waveform,
    pub envelope_shape: EnvelopeShape,
    pub gain: f64,
    pub wobble: Option<Wobble>,
    pub severity: Severity,
}

impl SonificationEvent {
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.event_duration
    }
}

/// Length of a whole event sequence, from zero to the end of its last tone.
pub fn sequence_duration(events: &[SonificationEvent]) -> Duration {
    events
        .iter()
        .map(SonificationEvent::end_offset)
        .max()
        .unwrap_or(Duration::ZERO)
}

/// Observed value span used to auto-scale a series into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Span of the finite values, `None` when there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|value| value.is_finite())
            .fold(None, |range: Option<ValueRange>, value| {
                Some(match range {
                    Some(range) => ValueRange {
                        min: range.min.min(value),
                        max: range.max.max(value),
                    },
                    None => ValueRange {
                        min: value,
                        max: value,
                    },
                })
            })
    }

    pub fn of_buckets(buckets: &[Bucket]) -> Option<Self> {
        Self::from_values(buckets.iter().map(|bucket| bucket.value))
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Position of `value` within the range. A flat range and non-finite
    /// values map to the midpoint.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.span();
        if !value.is_finite() || span <= f64::EPSILON {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

/// Converts buckets into timed synthesis events.
#[derive(Debug, Clone)]
pub struct AudioMapper {
    inter_event_gap: Duration,
    gain: f64,
    rhythmic: bool,
}

impl Default for AudioMapper {
    fn default() -> Self {
        Self {
            inter_event_gap: Duration::from_millis(200),
            gain: 0.8,
            rhythmic: true,
        }
    }
}

impl AudioMapper {
    pub fn new(inter_event_gap: Duration) -> Self {
        Self {
            inter_event_gap,
            ..Self::default()
        }
    }

    /// Peak gain applied to every event, clamped to `[0, 1]`.
    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 };
        self
    }

    /// Enables or disables the pulse wobble of rhythmic categories.
    pub fn with_rhythm(mut self, rhythmic: bool) -> Self {
        self.rhythmic = rhythmic;
        self
    }

    pub fn inter_event_gap(&self) -> Duration {
        self.inter_event_gap
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Maps every bucket to one event, in bucket order.
    ///
    /// Values are scaled against the min/max of `buckets` themselves, and all
    /// timing is divided by `playback_speed`.
    pub fn map_to_events(
        &self,
        buckets: &[Bucket],
        category: Category,
        playback_speed: f64,
    ) -> Result<Vec<SonificationEvent>> {
        if !playback_speed.is_finite() || playback_speed <= 0.0 {
            return Err(SonifyError::invalid(format!(
                "playback speed must be a positive number, got {playback_speed}"
            )));
        }

        let Some(range) = ValueRange::of_buckets(buckets) else {
            return Ok(Vec::new());
        };

        let mapping = CategoryMapping::for_category(category);
        let event_duration = scale_duration(mapping.event_duration, 1.0, playback_speed);

        let events = buckets
            .iter()
            .enumerate()
            .map(|(index, bucket)| SonificationEvent {
                frequency: mapping.frequency_at(range.normalize(bucket.value)),
                start_offset: scale_duration(self.inter_event_gap, index as f64, playback_speed),
                event_duration,
                waveform: mapping.waveform,
                envelope_shape: mapping.envelope,
                gain: self.gain,
                wobble: mapping.wobble.filter(|_| self.rhythmic),
                severity: bucket.severity,
            })
            .collect();

        Ok(events)
    }

    /// Single short percussive blip for `value`, scaled against `range`.
    pub fn blip(
        &self,
        value: f64,
        range: ValueRange,
        category: Category,
        severity: Severity,
        duration: Duration,
    ) -> SonificationEvent {
        let mapping = CategoryMapping::for_category(category);
        SonificationEvent {
            frequency: mapping.frequency_at(range.normalize(value)),
            start_offset: Duration::ZERO,
            event_duration: duration,
            waveform: mapping.waveform,
            envelope_shape: EnvelopeShape::Percussive,
            gain: self.gain,
            wobble: None,
            severity,
        }
    }
}

/// `duration * factor / speed`, rounded to the nearest nanosecond.
fn scale_duration(duration: Duration, factor: f64, speed: f64) -> Duration {
    let nanos = duration.as_nanos() as f64 * factor / speed;
    Duration::from_nanos(nanos.round().max(0.0) as u64)
}

/// Maps buckets with the default mapper settings.
pub fn map_to_events(
    buckets: &[Bucket],
    category: Category,
    playback_speed: f64,
) -> Result<Vec<SonificationEvent>> {
    AudioMapper::default().map_to_events(buckets, category, playback_speed)
}
