use tracing::warn;

use crate::metrics;
use crate::models::{NormalizedSeries, Point, RawSeriesResult};

pub const DEFAULT_LABEL_FORMAT: &str = "%H:%M:%S";

/// Fixed-divisor mapping from the source unit to the display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    pub divisor: f64,
    pub round: bool,
    pub unit: &'static str,
}

impl UnitConversion {
    pub const fn identity(unit: &'static str) -> Self {
        Self {
            divisor: 1.0,
            round: false,
            unit,
        }
    }

    pub const fn rounded(divisor: f64, unit: &'static str) -> Self {
        Self {
            divisor,
            round: true,
            unit,
        }
    }

    pub fn convert(&self, value: f64) -> f64 {
        let scaled = value / self.divisor;
        if self.round {
            scaled.round()
        } else {
            scaled
        }
    }

    pub fn apply(&self, mut series: NormalizedSeries) -> NormalizedSeries {
        for point in &mut series.points {
            point.value = self.convert(point.value);
        }
        series
    }
}

/// Turns a raw result into an ascending series.
///
/// Each value stays attached to the timestamp it was delivered with; the pairs
/// are then stably sorted by time, so duplicate timestamps keep their original
/// relative order. A result whose arrays differ in length cannot be paired and
/// is reported as an empty series.
pub fn normalize(raw: RawSeriesResult, label_format: &str) -> NormalizedSeries {
    if !raw.is_aligned() {
        warn!(
            id = %raw.id,
            timestamps = raw.timestamps.len(),
            values = raw.values.len(),
            "Malformed metric result, treating as empty"
        );
        metrics::record_malformed_result();
        return NormalizedSeries::empty(raw.id);
    }

    let mut pairs: Vec<_> = raw.timestamps.into_iter().zip(raw.values).collect();
    pairs.sort_by_key(|(timestamp, _)| *timestamp);

    let points = pairs
        .into_iter()
        .map(|(timestamp, value)| Point {
            label: timestamp.format(label_format).to_string(),
            timestamp,
            value,
        })
        .collect();

    NormalizedSeries { id: raw.id, points }
}
