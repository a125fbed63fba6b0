//! Per-resource descriptor table.
//!
//! Every chart the dashboard can draw is described here once: which metric to
//! query, how to aggregate it, what unit it is displayed in and how its y axis
//! is scaled. Views are driven entirely by these tables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::axis::AxisPolicy;
use crate::models::Statistic;
use crate::normalize::UnitConversion;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Category of measurement, carrying its unit and axis policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Percent,
    NetworkThroughput,
    Connections,
    Memory,
    Storage,
    Duration,
    Count,
}

impl MetricKind {
    pub fn conversion(&self) -> UnitConversion {
        match self {
            Self::Percent => UnitConversion::identity("%"),
            Self::NetworkThroughput => UnitConversion::identity("B/s"),
            Self::Connections | Self::Count => UnitConversion::identity("count"),
            Self::Memory => UnitConversion::rounded(BYTES_PER_MB, "MB"),
            Self::Storage => UnitConversion::rounded(BYTES_PER_GB, "GB"),
            Self::Duration => UnitConversion::identity("ms"),
        }
    }

    pub fn axis_policy(&self) -> AxisPolicy {
        match self {
            Self::Percent => AxisPolicy::Fixed {
                max: 100.0,
                step_size: 10.0,
            },
            Self::NetworkThroughput => AxisPolicy::Dynamic {
                rounding_unit: 500.0,
                padding: 500.0,
                minimum_step: 1.0,
                target_ticks: 6,
            },
            Self::Connections => AxisPolicy::Dynamic {
                rounding_unit: 1.0,
                padding: 5.0,
                minimum_step: 1.0,
                target_ticks: 10,
            },
            Self::Memory | Self::Storage => AxisPolicy::Dynamic {
                rounding_unit: 100.0,
                padding: 0.0,
                minimum_step: 100.0,
                target_ticks: 10,
            },
            Self::Duration => AxisPolicy::Dynamic {
                rounding_unit: 100.0,
                padding: 0.0,
                minimum_step: 1.0,
                target_ticks: 5,
            },
            Self::Count => AxisPolicy::Dynamic {
                rounding_unit: 1.0,
                padding: 0.0,
                minimum_step: 1.0,
                target_ticks: 10,
            },
        }
    }

    pub fn unit(&self) -> &'static str {
        self.conversion().unit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Ec2,
    Rds,
    S3,
    Lambda,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [Self::Ec2, Self::Rds, Self::S3, Self::Lambda];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ec2 => "ec2",
            Self::Rds => "rds",
            Self::S3 => "s3",
            Self::Lambda => "lambda",
        }
    }

    pub fn descriptor(&self) -> &'static ResourceDescriptor {
        match self {
            Self::Ec2 => &EC2,
            Self::Rds => &RDS,
            Self::S3 => &S3,
            Self::Lambda => &LAMBDA,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ec2" => Ok(Self::Ec2),
            "rds" => Ok(Self::Rds),
            "s3" => Ok(Self::S3),
            "lambda" => Ok(Self::Lambda),
            other => Err(format!("unknown resource kind '{}'", other)),
        }
    }
}

#[derive(Debug)]
pub struct MetricDescriptor {
    pub id: &'static str,
    pub metric_name: &'static str,
    pub kind: MetricKind,
    pub statistic: Statistic,
    pub title: &'static str,
    pub y_axis_label: &'static str,
    /// Dimensions appended after the resource's identifying dimension.
    pub extra_dimensions: &'static [(&'static str, &'static str)],
}

#[derive(Debug)]
pub struct ResourceDescriptor {
    pub kind: ResourceKind,
    pub title: &'static str,
    pub namespace: &'static str,
    pub dimension_name: &'static str,
    pub period: u32,
    pub default_window: Duration,
    pub describes_instance: bool,
    pub metrics: &'static [MetricDescriptor],
}

impl ResourceDescriptor {
    pub fn metric(&self, id: &str) -> Option<&'static MetricDescriptor> {
        self.metrics.iter().find(|m| m.id == id)
    }
}

const THREE_HOURS: Duration = Duration::from_secs(3 * 60 * 60);
const FIVE_MINUTES: u32 = 300;

static EC2: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::Ec2,
    title: "EC2 Instance Monitoring",
    namespace: "AWS/EC2",
    dimension_name: "InstanceId",
    period: FIVE_MINUTES,
    default_window: THREE_HOURS,
    describes_instance: false,
    metrics: &[
        MetricDescriptor {
            id: "cpu",
            metric_name: "CPUUtilization",
            kind: MetricKind::Percent,
            statistic: Statistic::Average,
            title: "CPU Utilization",
            y_axis_label: "CPU Usage (%)",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "networkIn",
            metric_name: "NetworkIn",
            kind: MetricKind::NetworkThroughput,
            statistic: Statistic::Average,
            title: "Network In",
            y_axis_label: "Bytes per Second",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "networkOut",
            metric_name: "NetworkOut",
            kind: MetricKind::NetworkThroughput,
            statistic: Statistic::Average,
            title: "Network Out",
            y_axis_label: "Bytes per Second",
            extra_dimensions: &[],
        },
    ],
};

static RDS: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::Rds,
    title: "RDS Instance Monitoring",
    namespace: "AWS/RDS",
    dimension_name: "DBInstanceIdentifier",
    period: FIVE_MINUTES,
    default_window: THREE_HOURS,
    describes_instance: true,
    metrics: &[
        MetricDescriptor {
            id: "cpu",
            metric_name: "CPUUtilization",
            kind: MetricKind::Percent,
            statistic: Statistic::Average,
            title: "CPU Utilization",
            y_axis_label: "CPU Usage (%)",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "connections",
            metric_name: "DatabaseConnections",
            kind: MetricKind::Connections,
            statistic: Statistic::Average,
            title: "Database Connections",
            y_axis_label: "Number of Connections",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "freeMemory",
            metric_name: "FreeableMemory",
            kind: MetricKind::Memory,
            statistic: Statistic::Average,
            title: "Free Memory",
            y_axis_label: "Memory (MB)",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "freeStorage",
            metric_name: "FreeStorageSpace",
            kind: MetricKind::Storage,
            statistic: Statistic::Average,
            title: "Free Storage Space",
            y_axis_label: "Storage (GB)",
            extra_dimensions: &[],
        },
    ],
};

// S3 storage metrics are emitted once a day.
static S3: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::S3,
    title: "S3 Bucket Monitoring",
    namespace: "AWS/S3",
    dimension_name: "BucketName",
    period: 86_400,
    default_window: Duration::from_secs(48 * 60 * 60),
    describes_instance: false,
    metrics: &[
        MetricDescriptor {
            id: "bucketSize",
            metric_name: "BucketSizeBytes",
            kind: MetricKind::Storage,
            statistic: Statistic::Average,
            title: "Bucket Size",
            y_axis_label: "Storage (GB)",
            extra_dimensions: &[("StorageType", "StandardStorage")],
        },
        MetricDescriptor {
            id: "objectCount",
            metric_name: "NumberOfObjects",
            kind: MetricKind::Count,
            statistic: Statistic::Average,
            title: "Object Count",
            y_axis_label: "Objects",
            extra_dimensions: &[("StorageType", "AllStorageTypes")],
        },
    ],
};

static LAMBDA: ResourceDescriptor = ResourceDescriptor {
    kind: ResourceKind::Lambda,
    title: "Lambda Function Monitoring",
    namespace: "AWS/Lambda",
    dimension_name: "FunctionName",
    period: FIVE_MINUTES,
    default_window: THREE_HOURS,
    describes_instance: false,
    metrics: &[
        MetricDescriptor {
            id: "invocations",
            metric_name: "Invocations",
            kind: MetricKind::Count,
            statistic: Statistic::Sum,
            title: "Invocations",
            y_axis_label: "Count",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "duration",
            metric_name: "Duration",
            kind: MetricKind::Duration,
            statistic: Statistic::Average,
            title: "Duration",
            y_axis_label: "Milliseconds",
            extra_dimensions: &[],
        },
        MetricDescriptor {
            id: "errors",
            metric_name: "Errors",
            kind: MetricKind::Count,
            statistic: Statistic::Sum,
            title: "Errors",
            y_axis_label: "Count",
            extra_dimensions: &[],
        },
    ],
};
