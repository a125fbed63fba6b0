use std::collections::HashSet;
use std::time::Duration;

use uuid::Uuid;

use crate::catalog::{MetricDescriptor, ResourceDescriptor, ResourceKind};
use crate::models::{Dimension, MetricQuerySpec, QueryBatch, TimeWindow};
use crate::{DashboardError, Result};

/// A resource kind bound to the instance it monitors.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceView {
    pub resource: ResourceKind,
    pub identifier: String,
    pub window: Duration,
}

impl ResourceView {
    pub fn new(resource: ResourceKind, identifier: impl Into<String>) -> Result<Self> {
        let identifier = identifier.into();
        let descriptor = resource.descriptor();
        if identifier.trim().is_empty() {
            return Err(DashboardError::ConfigMissing(format!(
                "{} value for {} view",
                descriptor.dimension_name, resource
            )));
        }

        Ok(Self {
            resource,
            identifier,
            window: descriptor.default_window,
        })
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn descriptor(&self) -> &'static ResourceDescriptor {
        self.resource.descriptor()
    }

    /// Identifying dimension first, then the metric's fixed extras.
    pub fn dimensions_for(&self, metric: &MetricDescriptor) -> Vec<Dimension> {
        let mut dimensions = vec![Dimension::new(
            self.descriptor().dimension_name,
            self.identifier.clone(),
        )];
        dimensions.extend(
            metric
                .extra_dimensions
                .iter()
                .map(|(name, value)| Dimension::new(*name, *value)),
        );
        dimensions
    }

    pub fn query_for(&self, metric: &MetricDescriptor) -> MetricQuerySpec {
        let descriptor = self.descriptor();
        MetricQuerySpec {
            id: metric.id.to_string(),
            namespace: descriptor.namespace.to_string(),
            metric_name: metric.metric_name.to_string(),
            dimensions: self.dimensions_for(metric),
            period: descriptor.period,
            statistic: metric.statistic,
        }
    }
}

/// Collects validated query specs into a batch with unique ids.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    queries: Vec<MetricQuerySpec>,
    ids: HashSet<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All metrics the view's resource descriptor lists.
    pub fn for_view(view: &ResourceView) -> Result<Self> {
        Self::for_view_metrics(view, view.descriptor().metrics.iter())
    }

    pub fn for_view_metrics<'a>(
        view: &ResourceView,
        metrics: impl IntoIterator<Item = &'a MetricDescriptor>,
    ) -> Result<Self> {
        let mut builder = Self::new();
        for metric in metrics {
            builder.push(view.query_for(metric))?;
        }
        Ok(builder)
    }

    pub fn push(&mut self, spec: MetricQuerySpec) -> Result<&mut Self> {
        validate(&spec)?;
        if !self.ids.insert(spec.id.clone()) {
            return Err(DashboardError::InvalidQuery(format!(
                "duplicate query id '{}' in batch",
                spec.id
            )));
        }
        self.queries.push(spec);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn build(self, window: TimeWindow) -> Result<QueryBatch> {
        if self.queries.is_empty() {
            return Err(DashboardError::InvalidQuery("empty query batch".to_string()));
        }

        Ok(QueryBatch {
            id: Uuid::new_v4(),
            window,
            queries: self.queries,
        })
    }
}

fn validate(spec: &MetricQuerySpec) -> Result<()> {
    let id_ok = spec.id.starts_with(|c: char| c.is_ascii_lowercase())
        && spec.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !id_ok {
        return Err(DashboardError::InvalidQuery(format!(
            "query id '{}' must start with a lowercase letter and contain only letters, digits or '_'",
            spec.id
        )));
    }

    if spec.namespace.is_empty() || spec.metric_name.is_empty() {
        return Err(DashboardError::InvalidQuery(format!(
            "query '{}' has no namespace or metric name",
            spec.id
        )));
    }

    if spec.dimensions.is_empty() {
        return Err(DashboardError::ConfigMissing(format!(
            "identifying dimension for query '{}'",
            spec.id
        )));
    }

    if let Some(dimension) = spec
        .dimensions
        .iter()
        .find(|d| d.name.is_empty() || d.value.trim().is_empty())
    {
        return Err(DashboardError::ConfigMissing(format!(
            "value for dimension '{}' of query '{}'",
            dimension.name, spec.id
        )));
    }

    if spec.period == 0 || i32::try_from(spec.period).is_err() {
        return Err(DashboardError::InvalidQuery(format!(
            "query '{}' has an out of range period of {}s",
            spec.id, spec.period
        )));
    }

    Ok(())
}
