//! Downsampling of raw readings into fixed-width time buckets.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Bucket, Category, Reading, Result, Severity, SonifyError, TimeRange};

/// How the values inside one bucket collapse into a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Arithmetic mean rounded to the nearest integer.
    Avg,
    /// Total rounded to the nearest integer.
    Sum,
    /// Value of the chronologically last reading.
    Latest,
}

impl Strategy {
    /// Strategy that suits the category when the caller has no preference.
    pub fn default_for(category: Category) -> Self {
        match category {
            Category::Steps | Category::Sleep => Strategy::Sum,
            Category::Weight => Strategy::Latest,
            Category::HeartRate | Category::Glucose | Category::BloodOxygen => Strategy::Avg,
        }
    }
}

impl FromStr for Strategy {
    type Err = SonifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" | "average" | "mean" => Ok(Strategy::Avg),
            "sum" | "total" => Ok(Strategy::Sum),
            "latest" | "last" => Ok(Strategy::Latest),
            other => Err(SonifyError::invalid(format!(
                "unknown aggregation strategy `{other}`"
            ))),
        }
    }
}

/// Groups `readings` into buckets of `bucket_width`, sorted by start time.
///
/// The input does not need to be ordered. Readings with non-finite values do
/// not contribute to a bucket's value but still raise its severity; a bucket
/// left without any finite value is dropped.
pub fn aggregate(
    readings: &[Reading],
    bucket_width: Duration,
    strategy: Strategy,
) -> Result<Vec<Bucket>> {
    if bucket_width <= Duration::zero() {
        return Err(SonifyError::invalid(format!(
            "bucket width must be positive, got {bucket_width}"
        )));
    }
    let width_ns = total_nanos(bucket_width);

    let mut buckets = Vec::new();
    let mut current: Option<BucketAccumulator> = None;

    for reading in sorted(readings) {
        let key = timestamp_nanos(&reading.timestamp).div_euclid(width_ns) * width_ns;
        match current.as_mut() {
            Some(acc) if acc.key_ns == key => acc.push(reading),
            _ => {
                if let Some(done) = current.take() {
                    buckets.extend(done.finish(strategy)?);
                }
                let mut acc = BucketAccumulator::new(key);
                acc.push(reading);
                current = Some(acc);
            }
        }
    }

    if let Some(done) = current {
        buckets.extend(done.finish(strategy)?);
    }

    tracing::trace!(
        readings = readings.len(),
        buckets = buckets.len(),
        width = %bucket_width,
        ?strategy,
        "aggregated readings"
    );
    Ok(buckets)
}

/// Aggregates using the bucket width associated with a chart time range.
///
/// The hour view is not bucketed: every finite reading becomes its own
/// bucket, starting at the reading's timestamp.
pub fn aggregate_range(
    readings: &[Reading],
    range: TimeRange,
    strategy: Strategy,
) -> Result<Vec<Bucket>> {
    match range.bucket_width() {
        Some(width) => aggregate(readings, width, strategy),
        None => Ok(pass_through(readings)),
    }
}

fn pass_through(readings: &[Reading]) -> Vec<Bucket> {
    sorted(readings)
        .into_iter()
        .filter(|reading| reading.value.is_finite())
        .map(|reading| Bucket {
            bucket_start: reading.timestamp,
            value: reading.value,
            severity: reading.severity,
            count: 1,
            unit: reading.unit.clone(),
        })
        .collect()
}

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Exact length of `duration` in nanoseconds.
fn total_nanos(duration: Duration) -> i128 {
    i128::from(duration.num_seconds()) * NANOS_PER_SECOND + i128::from(duration.subsec_nanos())
}

fn timestamp_nanos(timestamp: &DateTime<Utc>) -> i128 {
    i128::from(timestamp.timestamp()) * NANOS_PER_SECOND
        + i128::from(timestamp.timestamp_subsec_nanos())
}

/// Orders readings by timestamp, breaking ties by value and severity so the
/// result does not depend on the input permutation.
fn sorted(readings: &[Reading]) -> Vec<&Reading> {
    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.value.total_cmp(&b.value))
            .then_with(|| a.severity.cmp(&b.severity))
    });
    ordered
}

#[derive(Debug)]
struct BucketAccumulator {
    key_ns: i128,
    sum: f64,
    count: usize,
    first: f64,
    latest: f64,
    severity: Severity,
    unit: String,
    skipped: usize,
}

impl BucketAccumulator {
    fn new(key_ns: i128) -> Self {
        Self {
            key_ns,
            sum: 0.0,
            count: 0,
            first: 0.0,
            latest: 0.0,
            severity: Severity::Normal,
            unit: String::new(),
            skipped: 0,
        }
    }

    fn push(&mut self, reading: &Reading) {
        self.severity = self.severity.max(reading.severity);
        if self.unit.is_empty() {
            self.unit.clone_from(&reading.unit);
        } else if !reading.unit.is_empty() && reading.unit != self.unit {
            tracing::warn!(
                bucket_unit = %self.unit,
                reading_unit = %reading.unit,
                "mixed units in one bucket"
            );
        }
        if !reading.value.is_finite() {
            self.skipped += 1;
            return;
        }
        if self.count == 0 {
            self.first = reading.value;
        }
        self.sum += reading.value;
        self.latest = reading.value;
        self.count += 1;
    }

    fn finish(self, strategy: Strategy) -> Result<Option<Bucket>> {
        if self.skipped > 0 {
            tracing::debug!(
                bucket_ns = %self.key_ns,
                skipped = self.skipped,
                "ignored non-finite readings"
            );
        }
        if self.count == 0 {
            return Ok(None);
        }

        let value = match (self.count, strategy) {
            (1, _) => self.first,
            (_, Strategy::Avg) => (self.sum / self.count as f64).round(),
            (_, Strategy::Sum) => self.sum.round(),
            (_, Strategy::Latest) => self.latest,
        };

        let bucket_start = i64::try_from(self.key_ns.div_euclid(NANOS_PER_SECOND))
            .ok()
            .and_then(|secs| {
                let nanos = self.key_ns.rem_euclid(NANOS_PER_SECOND) as u32;
                DateTime::<Utc>::from_timestamp(secs, nanos)
            })
            .ok_or_else(|| {
                SonifyError::invalid(format!("bucket start {} ns is out of range", self.key_ns))
            })?;

        Ok(Some(Bucket {
            bucket_start,
            value,
            severity: self.severity,
            count: self.count,
            unit: self.unit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(ms: i64, value: f64, severity: Severity) -> Reading {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(ms).unwrap();
        Reading::new(timestamp, value, Category::HeartRate).with_severity(severity)
    }

    #[test]
    fn averages_two_readings_into_one_bucket() {
        let readings = vec![
            reading(0, 70.0, Severity::Normal),
            reading(200_000, 90.0, Severity::Warning),
        ];

        let buckets = aggregate(&readings, Duration::milliseconds(300_000), Strategy::Avg).unwrap();

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].value, 80.0);
        assert_eq!(buckets[0].severity, Severity::Warning);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].bucket_start.timestamp_millis(), 0);
    }

    #[test]
    fn single_danger_reading_taints_bucket() {
        let mut readings: Vec<Reading> = (0..20)
            .map(|i| reading(i * 1_000, 60.0, Severity::Normal))
            .collect();
        readings.push(reading(5_500, 61.0, Severity::Warning));
        readings.push(reading(7_500, 140.0, Severity::Danger));

        let buckets = aggregate(&readings, Duration::minutes(1), Strategy::Avg).unwrap();

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].severity, Severity::Danger);
    }

    #[test]
    fn output_is_sorted_and_independent_of_input_order() {
        let readings: Vec<Reading> = (0..50)
            .map(|i| {
                let severity = if i % 7 == 0 { Severity::Warning } else { Severity::Normal };
                reading(i * 37_000, 60.0 + (i % 11) as f64, severity)
            })
            .collect();
        let mut reversed = readings.clone();
        reversed.reverse();
        let mut rotated = readings.clone();
        rotated.rotate_left(17);

        for strategy in [Strategy::Avg, Strategy::Sum, Strategy::Latest] {
            let expected = aggregate(&readings, Duration::minutes(5), strategy).unwrap();
            assert_eq!(aggregate(&reversed, Duration::minutes(5), strategy).unwrap(), expected);
            assert_eq!(aggregate(&rotated, Duration::minutes(5), strategy).unwrap(), expected);
            assert!(expected
                .windows(2)
                .all(|pair| pair[0].bucket_start < pair[1].bucket_start));
        }
    }

    #[test]
    fn sum_and_latest_strategies() {
        let readings = vec![
            reading(120_000, 300.4, Severity::Normal),
            reading(10_000, 100.3, Severity::Normal),
            reading(60_000, 200.0, Severity::Normal),
        ];

        let summed = aggregate(&readings, Duration::minutes(5), Strategy::Sum).unwrap();
        assert_eq!(summed[0].value, 601.0);

        let latest = aggregate(&readings, Duration::minutes(5), Strategy::Latest).unwrap();
        assert_eq!(latest[0].value, 300.4);
    }

    #[test]
    fn single_reading_bucket_passes_value_through() {
        let readings = vec![reading(1_000, 72.6, Severity::Normal)];

        for strategy in [Strategy::Avg, Strategy::Sum, Strategy::Latest] {
            let buckets = aggregate(&readings, Duration::minutes(5), strategy).unwrap();
            assert_eq!(buckets[0].value, 72.6);
        }
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        let buckets = aggregate(&[], Duration::minutes(5), Strategy::Avg).unwrap();
        assert!(buckets.is_empty());
    }

    #[test]
    fn rejects_non_positive_width() {
        let readings = vec![reading(0, 1.0, Severity::Normal)];
        for width in [Duration::zero(), Duration::minutes(-5)] {
            let err = aggregate(&readings, width, Strategy::Avg).unwrap_err();
            assert!(matches!(err, SonifyError::InvalidArgument(_)));
        }
    }

    #[test]
    fn sub_millisecond_widths_are_honoured() {
        let readings = vec![
            reading(0, 10.0, Severity::Normal),
            reading(1, 20.0, Severity::Normal),
            reading(2, 30.0, Severity::Normal),
        ];

        let fine = aggregate(&readings, Duration::microseconds(500), Strategy::Avg).unwrap();
        assert_eq!(fine.len(), 3);

        let uneven = aggregate(&readings, Duration::microseconds(1_500), Strategy::Avg).unwrap();
        assert_eq!(uneven.len(), 2);
        assert_eq!(uneven[0].value, 15.0);
        assert_eq!(
            uneven[1].bucket_start,
            DateTime::<Utc>::from_timestamp(0, 1_500_000).unwrap()
        );

        let err = aggregate(&readings, Duration::nanoseconds(-1), Strategy::Avg).unwrap_err();
        assert!(matches!(err, SonifyError::InvalidArgument(_)));
    }

    #[test]
    fn buckets_keep_reading_unit() {
        let readings = vec![
            reading(0, 5.4, Severity::Normal).with_unit("mmol/L"),
            reading(60_000, 5.6, Severity::Normal).with_unit("mmol/L"),
        ];

        let buckets = aggregate(&readings, Duration::minutes(5), Strategy::Avg).unwrap();
        assert_eq!(buckets[0].unit, "mmol/L");

        let raw = aggregate_range(&readings, TimeRange::Hour, Strategy::Avg).unwrap();
        assert!(raw.iter().all(|bucket| bucket.unit == "mmol/L"));
    }

    #[test]
    fn non_finite_values_are_skipped_but_keep_severity() {
        let readings = vec![
            reading(0, 70.0, Severity::Normal),
            reading(1_000, f64::NAN, Severity::Danger),
            reading(2_000, 80.0, Severity::Normal),
            reading(400_000, f64::INFINITY, Severity::Normal),
        ];

        let buckets = aggregate(&readings, Duration::minutes(5), Strategy::Avg).unwrap();

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].value, 75.0);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].severity, Severity::Danger);
    }

    #[test]
    fn negative_timestamps_floor_towards_earlier_bucket() {
        let readings = vec![reading(-1, 10.0, Severity::Normal)];
        let buckets = aggregate(&readings, Duration::seconds(10), Strategy::Avg).unwrap();
        assert_eq!(buckets[0].bucket_start.timestamp_millis(), -10_000);
    }

    #[test]
    fn hour_range_passes_readings_through() {
        let readings = vec![
            reading(30_000, 71.0, Severity::Normal),
            reading(10_000, 70.5, Severity::Warning),
            reading(20_000, f64::NAN, Severity::Normal),
        ];

        let buckets = aggregate_range(&readings, TimeRange::Hour, Strategy::Avg).unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].value, 70.5);
        assert_eq!(buckets[0].severity, Severity::Warning);
        assert_eq!(buckets[1].bucket_start.timestamp_millis(), 30_000);
    }

    #[test]
    fn dense_day_is_bounded_by_range_width() {
        let readings: Vec<Reading> = (0..86_400)
            .map(|second| reading(second * 1_000, 60.0 + (second % 30) as f64, Severity::Normal))
            .collect();

        let buckets = aggregate_range(&readings, TimeRange::Day, Strategy::Avg).unwrap();

        assert_eq!(buckets.len(), 288);
    }

    #[test]
    fn default_strategies_follow_category_kind() {
        assert_eq!(Strategy::default_for(Category::Steps), Strategy::Sum);
        assert_eq!(Strategy::default_for(Category::HeartRate), Strategy::Avg);
        assert_eq!(Strategy::default_for(Category::Weight), Strategy::Latest);
        assert_eq!("mean".parse::<Strategy>().unwrap(), Strategy::Avg);
        assert!("median".parse::<Strategy>().is_err());
    }
}
