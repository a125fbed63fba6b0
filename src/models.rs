use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{DashboardError, Result};

/// Aggregation applied within each period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Statistic {
    Average,
    Sum,
    Minimum,
    Maximum,
    SampleCount,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Average => "Average",
            Self::Sum => "Sum",
            Self::Minimum => "Minimum",
            Self::Maximum => "Maximum",
            Self::SampleCount => "SampleCount",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQuerySpec {
    pub id: String,
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub period: u32,
    pub statistic: Statistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(DashboardError::InvalidQuery(format!(
                "time window end {} is not after start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Window of length `span` that closes at `end`.
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Result<Self> {
        let start = chrono::Duration::from_std(span)
            .ok()
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                DashboardError::InvalidQuery(format!("window of {:?} is too large", span))
            })?;
        Self::new(start, end)
    }

    /// Window of length `span` that closes now.
    pub fn last(span: Duration) -> Result<Self> {
        Self::ending_at(Utc::now(), span)
    }

    pub fn span(&self) -> chrono::Duration {
        self.end - self.start
    }
}

/// One fetch invocation: the queries plus the window they share.
#[derive(Debug, Clone, Serialize)]
pub struct QueryBatch {
    pub id: Uuid,
    pub window: TimeWindow,
    pub queries: Vec<MetricQuerySpec>,
}

impl QueryBatch {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().map(|q| q.id.as_str())
    }
}

/// Series as delivered by the metrics source. Timestamps may arrive in any order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSeriesResult {
    pub id: String,
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
}

impl RawSeriesResult {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.timestamps.len() == self.values.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub value: f64,
}

/// Chart-ready series, ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedSeries {
    pub id: String,
    pub points: Vec<Point>,
}

impl NormalizedSeries {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.points.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Largest finite value, if any.
    pub fn max_value(&self) -> Option<f64> {
        self.points
            .iter()
            .map(|p| p.value)
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisScale {
    pub max: f64,
    pub step_size: f64,
    pub unit: String,
}

/// Static attributes of a described database instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceInfo {
    pub identifier: String,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub instance_class: Option<String>,
    pub allocated_storage_gb: Option<i64>,
    pub endpoint_address: Option<String>,
    pub endpoint_port: Option<i32>,
    pub status: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub backup_retention_days: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoRow {
    pub label: &'static str,
    pub value: String,
}

impl InstanceInfo {
    /// Rows of the read-only info table, in display order.
    pub fn rows(&self) -> Vec<InfoRow> {
        fn text(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }

        let engine = match (&self.engine, &self.engine_version) {
            (Some(engine), Some(version)) => format!("{} {}", engine, version),
            (Some(engine), None) => engine.clone(),
            (None, Some(version)) => version.clone(),
            (None, None) => String::new(),
        };

        vec![
            InfoRow { label: "Engine", value: engine },
            InfoRow { label: "Instance Class", value: text(&self.instance_class) },
            InfoRow {
                label: "Storage",
                value: self
                    .allocated_storage_gb
                    .map(|gb| format!("{} GB", gb))
                    .unwrap_or_default(),
            },
            InfoRow { label: "Endpoint", value: text(&self.endpoint_address) },
            InfoRow {
                label: "Port",
                value: self.endpoint_port.map(|p| p.to_string()).unwrap_or_default(),
            },
            InfoRow { label: "Status", value: text(&self.status) },
            InfoRow {
                label: "Created",
                value: self
                    .created_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            },
            InfoRow {
                label: "Backup Retention",
                value: self
                    .backup_retention_days
                    .map(|d| format!("{} days", d))
                    .unwrap_or_default(),
            },
        ]
    }
}
