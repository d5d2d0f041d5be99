//! Core data model shared by every stage of the engine.
//!
//! Readings arrive from the host application, the aggregator turns them into
//! buckets, and everything downstream (mapping, playback, exploration) works
//! on buckets only.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, SonifyError};

/// Health metric a reading belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    HeartRate,
    Glucose,
    Steps,
    Sleep,
    BloodOxygen,
    Weight,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::HeartRate,
        Category::Glucose,
        Category::Steps,
        Category::Sleep,
        Category::BloodOxygen,
        Category::Weight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::HeartRate => "heart_rate",
            Category::Glucose => "glucose",
            Category::Steps => "steps",
            Category::Sleep => "sleep",
            Category::BloodOxygen => "blood_oxygen",
            Category::Weight => "weight",
        }
    }

    /// Human readable name used in narration.
    pub fn label(&self) -> &'static str {
        match self {
            Category::HeartRate => "Heart rate",
            Category::Glucose => "Glucose",
            Category::Steps => "Steps",
            Category::Sleep => "Sleep",
            Category::BloodOxygen => "Blood oxygen",
            Category::Weight => "Weight",
        }
    }

    pub fn default_unit(&self) -> &'static str {
        match self {
            Category::HeartRate => "bpm",
            Category::Glucose => "mg/dL",
            Category::Steps => "steps",
            Category::Sleep => "min",
            Category::BloodOxygen => "%",
            Category::Weight => "kg",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SonifyError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| SonifyError::invalid(format!("unknown category `{s}`")))
    }
}

/// Clinical classification attached to every reading.
///
/// The variant order is the severity order, so `max` picks the most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// A single timestamped measurement supplied by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub category: Category,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub unit: String,
}

impl Reading {
    /// Creates a normal-severity reading using the category's default unit.
    pub fn new(timestamp: DateTime<Utc>, value: f64, category: Category) -> Self {
        Self {
            timestamp,
            value,
            category,
            severity: Severity::Normal,
            unit: category.default_unit().to_string(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// One fixed-width time window with a single aggregated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub bucket_start: DateTime<Utc>,
    pub value: f64,
    /// Most severe classification among the readings in the window.
    pub severity: Severity,
    /// Number of readings that contributed to `value`.
    pub count: usize,
    /// Unit reported by the readings; empty when they carried none.
    #[serde(default)]
    pub unit: String,
}

/// Time range selection made by the host's chart controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "H")]
    Hour,
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "M")]
    Month,
    #[serde(rename = "6M")]
    HalfYear,
    #[serde(rename = "Y")]
    Year,
}

impl TimeRange {
    pub const ALL: [TimeRange; 6] = [
        TimeRange::Hour,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
        TimeRange::HalfYear,
        TimeRange::Year,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            TimeRange::Hour => "H",
            TimeRange::Day => "D",
            TimeRange::Week => "W",
            TimeRange::Month => "M",
            TimeRange::HalfYear => "6M",
            TimeRange::Year => "Y",
        }
    }

    /// Length of the period the range displays.
    pub fn span(&self) -> Duration {
        match self {
            TimeRange::Hour => Duration::hours(1),
            TimeRange::Day => Duration::days(1),
            TimeRange::Week => Duration::days(7),
            TimeRange::Month => Duration::days(30),
            TimeRange::HalfYear => Duration::days(182),
            TimeRange::Year => Duration::days(365),
        }
    }

    /// Bucket width used for the range, `None` meaning raw pass-through.
    ///
    /// Widths are picked so a full period stays within a few hundred points.
    pub fn bucket_width(&self) -> Option<Duration> {
        match self {
            TimeRange::Hour => None,
            TimeRange::Day => Some(Duration::minutes(5)),
            TimeRange::Week => Some(Duration::minutes(30)),
            TimeRange::Month => Some(Duration::hours(2)),
            TimeRange::HalfYear => Some(Duration::hours(12)),
            TimeRange::Year => Some(Duration::days(1)),
        }
    }
}

impl FromStr for TimeRange {
    type Err = SonifyError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim().to_ascii_uppercase();
        TimeRange::ALL
            .into_iter()
            .find(|range| range.token() == token)
            .ok_or_else(|| SonifyError::invalid(format!("unknown time range `{s}`")))
    }
}
