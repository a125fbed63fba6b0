//! Property-based tests for series normalization and axis scaling

use proptest::prelude::*;

use chrono::{DateTime, Duration, TimeZone, Utc};

use cloudwatch_dashboard::axis::compute_scale;
use cloudwatch_dashboard::catalog::MetricKind;
use cloudwatch_dashboard::models::{NormalizedSeries, Point, RawSeriesResult};
use cloudwatch_dashboard::normalize::{normalize, DEFAULT_LABEL_FORMAT};

const UNBOUNDED_KINDS: [MetricKind; 6] = [
    MetricKind::NetworkThroughput,
    MetricKind::Connections,
    MetricKind::Memory,
    MetricKind::Storage,
    MetricKind::Duration,
    MetricKind::Count,
];

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 1, 6, 0, 0).unwrap()
}

// ============================================================================
// Test Strategies
// ============================================================================

/// Few distinct minutes so duplicate timestamps show up often.
fn pairs_strategy() -> impl Strategy<Value = Vec<(i64, f64)>> {
    prop::collection::vec((0i64..24, -1.0e6f64..1.0e6), 0..64)
}

fn values_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(prop_oneof![Just(0.0), 0.0f64..1.0e12, -1.0e3f64..0.0], 0..32)
}

fn raw(pairs: &[(i64, f64)]) -> RawSeriesResult {
    RawSeriesResult {
        id: "cpu".to_string(),
        timestamps: pairs.iter().map(|(m, _)| base() + Duration::minutes(*m)).collect(),
        values: pairs.iter().map(|(_, v)| *v).collect(),
    }
}

fn series(values: &[f64]) -> NormalizedSeries {
    NormalizedSeries {
        id: "s".to_string(),
        points: values
            .iter()
            .enumerate()
            .map(|(i, &value)| Point {
                timestamp: base() + Duration::minutes(5 * i as i64),
                label: String::new(),
                value,
            })
            .collect(),
    }
}

// ============================================================================
// Normalization Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Output has exactly as many points as input pairs
    #[test]
    fn prop_length_preserved(pairs in pairs_strategy()) {
        let series = normalize(raw(&pairs), DEFAULT_LABEL_FORMAT);
        prop_assert_eq!(series.len(), pairs.len());
    }

    /// Timestamps never decrease along the series
    #[test]
    fn prop_timestamps_non_decreasing(pairs in pairs_strategy()) {
        let series = normalize(raw(&pairs), DEFAULT_LABEL_FORMAT);
        for window in series.points.windows(2) {
            prop_assert!(window[0].timestamp <= window[1].timestamp);
        }
    }

    /// Every output point is an input (timestamp, value) pair, with multiplicity
    #[test]
    fn prop_values_stay_with_timestamps(pairs in pairs_strategy()) {
        let series = normalize(raw(&pairs), DEFAULT_LABEL_FORMAT);

        let key = |t: DateTime<Utc>, v: f64| (t.timestamp(), v.to_bits());
        let mut expected: Vec<_> = pairs
            .iter()
            .map(|(m, v)| key(base() + Duration::minutes(*m), *v))
            .collect();
        let mut actual: Vec<_> = series.points.iter().map(|p| key(p.timestamp, p.value)).collect();
        expected.sort_unstable();
        actual.sort_unstable();
        prop_assert_eq!(actual, expected);
    }

    /// Points sharing a timestamp keep their input order
    #[test]
    fn prop_ties_keep_input_order(pairs in pairs_strategy()) {
        let series = normalize(raw(&pairs), DEFAULT_LABEL_FORMAT);

        for minute in 0..24 {
            let t = base() + Duration::minutes(minute);
            let input: Vec<u64> = pairs
                .iter()
                .filter(|(m, _)| *m == minute)
                .map(|(_, v)| v.to_bits())
                .collect();
            let output: Vec<u64> = series
                .points
                .iter()
                .filter(|p| p.timestamp == t)
                .map(|p| p.value.to_bits())
                .collect();
            prop_assert_eq!(output, input);
        }
    }

    /// Labels are the formatted timestamp of their own point
    #[test]
    fn prop_labels_match_timestamps(pairs in pairs_strategy()) {
        let series = normalize(raw(&pairs), "%H:%M");
        for point in &series.points {
            prop_assert_eq!(point.label.clone(), point.timestamp.format("%H:%M").to_string());
        }
    }
}

// ============================================================================
// Axis Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Unbounded kinds always cover the data with a positive axis
    #[test]
    fn prop_unbounded_axis_covers_data(values in values_strategy()) {
        let series = series(&values);
        let observed = series.max_value().unwrap_or(0.0);

        for kind in UNBOUNDED_KINDS {
            let axis = compute_scale(&series, kind);
            prop_assert!(axis.max > 0.0, "{:?}: max {}", kind, axis.max);
            prop_assert!(axis.max >= observed, "{:?}: max {} < {}", kind, axis.max, observed);
            prop_assert!(axis.step_size > 0.0, "{:?}: step {}", kind, axis.step_size);
        }
    }

    /// Percent axes ignore the data entirely
    #[test]
    fn prop_percent_axis_fixed(values in values_strategy()) {
        let axis = compute_scale(&series(&values), MetricKind::Percent);
        prop_assert_eq!(axis.max, 100.0);
        prop_assert_eq!(axis.step_size, 10.0);
        prop_assert_eq!(axis.unit, "%");
    }
}
