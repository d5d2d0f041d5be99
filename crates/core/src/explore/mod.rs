//! Pointer-driven exploration of a bucketed series.
//!
//! The host reports the pointer's horizontal position normalised to the
//! chart width. Each time the pointer crosses onto a different data point the
//! explorer emits one [`Cue`]: a short tone scaled to the value and a haptic
//! pulse keyed by severity.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    mode::{ChannelSet, CueGranularity},
    AudioEngine, AudioMapper, Bucket, Category, Severity, SonificationEvent, ValueRange,
};

/// Three-level haptic pulse strength.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HapticIntensity {
    Light,
    Medium,
    Heavy,
}

impl From<Severity> for HapticIntensity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Normal => HapticIntensity::Light,
            Severity::Warning => HapticIntensity::Medium,
            Severity::Danger => HapticIntensity::Heavy,
        }
    }
}

/// Overall movement between the first and last point of a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rising,
    Falling,
    Stable,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rising => "rising",
            Direction::Falling => "falling",
            Direction::Stable => "stable",
        }
    }
}

/// Feedback emitted when the pointer reaches a new data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub index: usize,
    pub value: f64,
    pub severity: Severity,
    /// Unit of the bucket's readings; empty when the readings carried none.
    #[serde(default)]
    pub unit: String,
    pub tone: Option<SonificationEvent>,
    pub haptic: Option<HapticIntensity>,
}

/// Consolidated result of one exploration gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub min: f64,
    pub max: f64,
    pub first: f64,
    pub last: f64,
    pub direction: Direction,
    /// Number of distinct points visited, in order.
    pub visited: usize,
    #[serde(default)]
    pub unit: String,
}

/// Per-gesture memory of the points visited.
#[derive(Debug, Clone, Default)]
pub struct ExplorationCursor {
    last_index: Option<usize>,
    trail: Vec<usize>,
}

impl ExplorationCursor {
    /// Records `index`; returns `false` when it repeats the previous point.
    pub fn visit(&mut self, index: usize) -> bool {
        if self.last_index == Some(index) {
            return false;
        }
        self.last_index = Some(index);
        self.trail.push(index);
        true
    }

    pub fn last_index(&self) -> Option<usize> {
        self.last_index
    }

    pub fn trail(&self) -> &[usize] {
        &self.trail
    }

    pub fn reset(&mut self) {
        self.last_index = None;
        self.trail.clear();
    }
}

/// What the explorer emits and how.
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreOptions {
    /// Cue tone gain, `None` when audio cues are off.
    pub cue_volume: Option<f64>,
    pub haptics: bool,
    pub granularity: CueGranularity,
    pub coarse_stops: usize,
    pub cue_duration: Duration,
    pub attack: Duration,
    pub stable_fraction: f64,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self::from_channels(
            &crate::mode::resolve_active_channels(
                crate::mode::AccessibilityMode::Audio,
                Default::default(),
            ),
            &AppConfig::default(),
        )
    }
}

impl ExploreOptions {
    pub fn from_channels(channels: &ChannelSet, config: &AppConfig) -> Self {
        Self {
            cue_volume: channels
                .audio_cues
                .map(|cues| cues.volume * config.audio.master_volume),
            haptics: channels.haptics,
            granularity: channels.granularity,
            coarse_stops: config.explore.simplified_stops,
            cue_duration: config.explore.cue_duration(),
            attack: config.audio.attack(),
            stable_fraction: config.explore.stable_fraction,
        }
    }
}

type CueListener = Box<dyn FnMut(&Cue) + Send>;

/// Maps pointer motion over a rendered series to per-point cues.
pub struct TouchExplorer {
    buckets: Vec<Bucket>,
    category: Category,
    range: Option<ValueRange>,
    options: ExploreOptions,
    cursor: ExplorationCursor,
    engine: Option<AudioEngine>,
    listener: Option<CueListener>,
}

impl TouchExplorer {
    pub fn new(buckets: Vec<Bucket>, category: Category) -> Self {
        let range = ValueRange::of_buckets(&buckets);
        Self {
            buckets,
            category,
            range,
            options: ExploreOptions::default(),
            cursor: ExplorationCursor::default(),
            engine: None,
            listener: None,
        }
    }

    pub fn with_options(mut self, options: ExploreOptions) -> Self {
        self.options = options;
        self
    }

    /// Plays cue tones on `engine` as they fire.
    pub fn with_engine(mut self, engine: AudioEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Registers the callback invoked for every fired cue.
    pub fn on_cue(mut self, listener: impl FnMut(&Cue) + Send + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn cursor(&self) -> &ExplorationCursor {
        &self.cursor
    }

    /// Bucket index under `position`, clamped to the chart's extent.
    ///
    /// Coarse granularity spreads `coarse_stops` stops evenly from the first
    /// to the last bucket, so both ends of the series stay reachable.
    pub fn resolve_index(&self, position: f64) -> Option<usize> {
        if self.buckets.is_empty() || position.is_nan() {
            return None;
        }
        let last = self.buckets.len() - 1;
        let position = position.clamp(0.0, 1.0);

        match self.options.granularity {
            CueGranularity::Fine => Some((position * last as f64).round() as usize),
            CueGranularity::Coarse => {
                let stops = self.options.coarse_stops.clamp(1, last + 1);
                if stops == 1 {
                    return Some(last);
                }
                let spans = stops - 1;
                let stop = (position * spans as f64).round() as usize;
                Some((stop * last + spans / 2) / spans)
            }
        }
    }

    /// Handles pointer motion; returns the cue when a new point was reached.
    pub fn on_pointer_move(&mut self, position: f64) -> Option<Cue> {
        let index = self.resolve_index(position)?;
        if !self.cursor.visit(index) {
            return None;
        }

        let bucket = &self.buckets[index];
        let tone = self
            .options
            .cue_volume
            .zip(self.range)
            .map(|(volume, range)| {
                AudioMapper::default().with_gain(volume).blip(
                    bucket.value,
                    range,
                    self.category,
                    bucket.severity,
                    self.options.cue_duration,
                )
            });
        let haptic = self
            .options
            .haptics
            .then(|| HapticIntensity::from(bucket.severity));

        let cue = Cue {
            index,
            value: bucket.value,
            severity: bucket.severity,
            unit: bucket.unit.clone(),
            tone,
            haptic,
        };

        if let (Some(engine), Some(tone)) = (&self.engine, &cue.tone) {
            if let Err(err) = engine.play_now(tone, self.options.attack) {
                tracing::debug!(%err, index, "touch cue not played");
            }
        }
        if let Some(listener) = self.listener.as_mut() {
            listener(&cue);
        }

        Some(cue)
    }

    /// Ends the gesture and summarises the points visited.
    ///
    /// Values are taken from the finite buckets of the trail. Returns `None`
    /// when nothing was visited or no visited bucket holds a finite value.
    pub fn on_pointer_release(&mut self) -> Option<SummaryReport> {
        let cursor = std::mem::take(&mut self.cursor);
        let unit = cursor
            .trail()
            .first()
            .map(|&index| self.buckets[index].unit.clone())
            .unwrap_or_default();
        let values: Vec<f64> = cursor
            .trail()
            .iter()
            .map(|&index| self.buckets[index].value)
            .filter(|value| value.is_finite())
            .collect();

        let first = *values.first()?;
        let last = *values.last()?;
        let visited = ValueRange::from_values(values.iter().copied())?;

        let threshold = self.range.map(|range| range.span()).unwrap_or(0.0)
            * self.options.stable_fraction;
        let delta = last - first;
        let direction = if delta.abs() <= threshold {
            Direction::Stable
        } else if delta > 0.0 {
            Direction::Rising
        } else {
            Direction::Falling
        };

        Some(SummaryReport {
            min: visited.min,
            max: visited.max,
            first,
            last,
            direction,
            visited: cursor.trail().len(),
            unit,
        })
    }
}

impl std::fmt::Debug for TouchExplorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TouchExplorer")
            .field("buckets", &self.buckets.len())
            .field("category", &self.category)
            .field("options", &self.options)
            .field("cursor", &self.cursor)
            .finish()
    }
}
