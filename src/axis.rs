use serde::{Deserialize, Serialize};

use crate::catalog::MetricKind;
use crate::models::{AxisScale, NormalizedSeries};

/// How the y axis of a chart is derived from its data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisPolicy {
    /// Values are bounded; the observed range is ignored.
    Fixed { max: f64, step_size: f64 },
    /// `max = ceil(observed / rounding_unit) * rounding_unit + padding`
    Dynamic {
        rounding_unit: f64,
        padding: f64,
        minimum_step: f64,
        target_ticks: u32,
    },
}

impl AxisPolicy {
    pub fn scale(&self, observed_max: Option<f64>, unit: &str) -> AxisScale {
        match *self {
            AxisPolicy::Fixed { max, step_size } => AxisScale {
                max,
                step_size,
                unit: unit.to_string(),
            },
            AxisPolicy::Dynamic {
                rounding_unit,
                padding,
                minimum_step,
                target_ticks,
            } => {
                // Floor at 1 so an empty or all-zero series never collapses the axis.
                let observed = observed_max.unwrap_or(0.0).max(1.0);
                let mut rounded = (observed / rounding_unit).ceil() * rounding_unit;
                // The division can round down onto a whole multiple below the data.
                if rounded < observed {
                    rounded += rounding_unit;
                }
                let max = rounded + padding;
                let step_size = (max / target_ticks.max(1) as f64).ceil().max(minimum_step);
                AxisScale {
                    max,
                    step_size,
                    unit: unit.to_string(),
                }
            }
        }
    }
}

/// Axis for an already unit-converted series of the given kind.
pub fn compute_scale(series: &NormalizedSeries, kind: MetricKind) -> AxisScale {
    kind.axis_policy().scale(series.max_value(), kind.unit())
}
