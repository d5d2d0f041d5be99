//! Plain-text phrases for the speech layer.

use std::time::Duration;

use crate::{
    explore::{Cue, SummaryReport},
    mapping::PlaybackSpeed,
    Bucket, Category, Severity,
};

/// Unit to announce: the readings' own unit, else the category's usual one.
pub fn display_unit(unit: &str, category: Category) -> &str {
    if unit.trim().is_empty() {
        category.default_unit()
    } else {
        unit
    }
}

/// Formats `value` with the precision a listener needs.
pub fn describe_value(value: f64, unit: &str) -> String {
    let number = if (value - value.round()).abs() < 0.05 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.1}")
    };
    if unit.is_empty() {
        number
    } else {
        format!("{number} {unit}")
    }
}

fn severity_suffix(severity: Severity) -> &'static str {
    match severity {
        Severity::Normal => "",
        Severity::Warning => ", warning",
        Severity::Danger => ", danger",
    }
}

pub fn describe_bucket(bucket: &Bucket, category: Category) -> String {
    format!(
        "{} at {}{}",
        describe_value(bucket.value, display_unit(&bucket.unit, category)),
        bucket.bucket_start.format("%b %-d, %H:%M"),
        severity_suffix(bucket.severity)
    )
}

pub fn describe_cue(cue: &Cue, category: Category) -> String {
    format!(
        "{}{}",
        describe_value(cue.value, display_unit(&cue.unit, category)),
        severity_suffix(cue.severity)
    )
}

/// One-sentence recap of an exploration gesture.
pub fn describe_summary(report: &SummaryReport, category: Category) -> String {
    let label = category.label();
    let unit = display_unit(&report.unit, category);
    let points = if report.visited == 1 { "point" } else { "points" };
    format!(
        "{label} {} from {} to {}. Lowest {}, highest {}, across {} {points}.",
        report.direction.as_str(),
        describe_value(report.first, unit),
        describe_value(report.last, unit),
        describe_value(report.min, unit),
        describe_value(report.max, unit),
        report.visited,
    )
}

/// Announcement spoken before whole-series playback.
pub fn describe_playback(
    category: Category,
    points: usize,
    length: Duration,
    speed: PlaybackSpeed,
) -> String {
    let seconds = length.as_secs_f64();
    let speed = match speed {
        PlaybackSpeed::Normal => String::new(),
        other => format!(" at {}x speed", other.multiplier()),
    };
    format!(
        "Playing {} {} values over {seconds:.1} seconds{speed}.",
        points,
        category.label().to_lowercase()
    )
}
