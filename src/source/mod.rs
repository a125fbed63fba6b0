//! Boundaries to the external metrics and describe APIs.
//!
//! The engine only talks to these traits; handles are constructed once with
//! explicit configuration and passed in, so tests can substitute
//! [`memory::InMemorySource`].

pub mod cloudwatch;
pub mod memory;
pub mod rds;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::FetchFailureKind;
use crate::models::{InstanceInfo, MetricQuerySpec, RawSeriesResult, TimeWindow};

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct SourceError {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Throttled, message)
    }
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Runs every query over `window`. Results may come back in any order and
    /// ids without data may be missing.
    async fn get_metric_data(
        &self,
        queries: &[MetricQuerySpec],
        window: &TimeWindow,
    ) -> Result<Vec<RawSeriesResult>, SourceError>;
}

#[async_trait]
pub trait InstanceDescriber: Send + Sync {
    async fn describe_instance(&self, identifier: &str)
        -> Result<Option<InstanceInfo>, SourceError>;
}
