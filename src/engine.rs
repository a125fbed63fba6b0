//! Metric query engine.
//!
//! Turns a [`ResourceView`] into chart panels: build the query batch, fetch
//! it, then normalize, convert and scale each series according to its
//! [`MetricKind`]. One engine serves every resource kind; the differences
//! between resources live in the catalog tables.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::axis::compute_scale;
use crate::catalog::{MetricDescriptor, MetricKind};
use crate::fetch::MetricFetcher;
use crate::models::{AxisScale, InstanceInfo, NormalizedSeries, QueryBatch, RawSeriesResult, TimeWindow};
use crate::normalize::{normalize, DEFAULT_LABEL_FORMAT};
use crate::query::{QueryBuilder, ResourceView};
use crate::source::{InstanceDescriber, MetricsSource, SourceError};
use crate::Result;

/// Everything a chart renderer needs for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPanel {
    pub id: String,
    pub title: String,
    pub y_axis_label: String,
    pub kind: MetricKind,
    pub series: NormalizedSeries,
    pub axis: AxisScale,
}

pub struct MetricEngine {
    fetcher: MetricFetcher,
    describer: Option<Arc<dyn InstanceDescriber>>,
    label_format: String,
}

impl MetricEngine {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self {
            fetcher: MetricFetcher::new(source),
            describer: None,
            label_format: DEFAULT_LABEL_FORMAT.to_string(),
        }
    }

    pub fn with_describer(mut self, describer: Arc<dyn InstanceDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    pub fn with_label_format(mut self, format: impl Into<String>) -> Self {
        self.label_format = format.into();
        self
    }

    /// Builds the batch for every metric of the view over `window`.
    pub fn plan(&self, view: &ResourceView, window: TimeWindow) -> Result<QueryBatch> {
        QueryBuilder::for_view(view)?.build(window)
    }

    /// Fetches a planned batch and renders one panel per catalog metric.
    pub async fn fetch_panels(
        &self,
        view: &ResourceView,
        batch: &QueryBatch,
    ) -> Result<Vec<ChartPanel>> {
        let mut fetched = self.fetcher.fetch(batch, view.resource.as_str()).await?;

        let panels = view
            .descriptor()
            .metrics
            .iter()
            .filter(|metric| batch.ids().any(|id| id == metric.id))
            .map(|metric| self.render(metric, fetched.take(metric.id)))
            .collect();

        Ok(panels)
    }

    /// Plans and fetches in one step over the view's default window.
    pub async fn run(&self, view: &ResourceView) -> Result<Vec<ChartPanel>> {
        let window = TimeWindow::last(view.window)?;
        let batch = self.plan(view, window)?;
        self.fetch_panels(view, &batch).await
    }

    pub fn render(&self, metric: &MetricDescriptor, raw: RawSeriesResult) -> ChartPanel {
        let series = normalize(raw, &self.label_format);
        let series = metric.kind.conversion().apply(series);
        let axis = compute_scale(&series, metric.kind);
        debug!(id = metric.id, points = series.len(), max = axis.max, "Rendered panel");

        ChartPanel {
            id: metric.id.to_string(),
            title: metric.title.to_string(),
            y_axis_label: metric.y_axis_label.to_string(),
            kind: metric.kind,
            series,
            axis,
        }
    }

    /// Describes the view's instance, when its resource supports it and a
    /// describer is configured.
    pub async fn describe(
        &self,
        view: &ResourceView,
    ) -> Option<std::result::Result<Option<InstanceInfo>, SourceError>> {
        if !view.descriptor().describes_instance {
            return None;
        }
        let describer = self.describer.as_ref()?;
        Some(describer.describe_instance(&view.identifier).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceKind;
    use crate::source::memory::InMemorySource;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 4, 12, minute, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::ending_at(at(30), Duration::from_secs(3 * 3600)).unwrap()
    }

    #[tokio::test]
    async fn test_rds_memory_and_storage_converted() {
        let source = Arc::new(InMemorySource::with_results(vec![
            RawSeriesResult {
                id: "freeMemory".to_string(),
                timestamps: vec![at(5), at(0)],
                values: vec![2.0 * 1_048_576.0, 1_048_576.0],
            },
            RawSeriesResult {
                id: "freeStorage".to_string(),
                timestamps: vec![at(0)],
                values: vec![1_073_741_824.0],
            },
        ]));
        let engine = MetricEngine::new(source);
        let view = ResourceView::new(ResourceKind::Rds, "orders-db").unwrap();
        let batch = engine.plan(&view, window()).unwrap();

        let panels = engine.fetch_panels(&view, &batch).await.unwrap();
        let ids: Vec<_> = panels.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["cpu", "connections", "freeMemory", "freeStorage"]);

        let memory = &panels[2];
        assert_eq!(memory.series.values(), vec![1.0, 2.0]);
        assert_eq!(memory.axis.unit, "MB");
        assert_eq!(memory.axis.max, 100.0);

        let storage = &panels[3];
        assert_eq!(storage.series.values(), vec![1.0]);
        assert_eq!(storage.axis.unit, "GB");

        // No data for cpu or connections: empty but still scaled.
        assert!(panels[0].series.is_empty());
        assert_eq!(panels[0].axis.max, 100.0);
        assert!(panels[1].axis.max > 0.0);
    }

    #[tokio::test]
    async fn test_describe_only_for_rds() {
        let source = Arc::new(InMemorySource::new());
        source.insert_instance(InstanceInfo {
            identifier: "orders-db".to_string(),
            engine: Some("postgres".to_string()),
            ..Default::default()
        });
        let engine = MetricEngine::new(source.clone()).with_describer(source);

        let rds = ResourceView::new(ResourceKind::Rds, "orders-db").unwrap();
        let info = engine.describe(&rds).await.unwrap().unwrap().unwrap();
        assert_eq!(info.engine.as_deref(), Some("postgres"));

        let ec2 = ResourceView::new(ResourceKind::Ec2, "i-123").unwrap();
        assert!(engine.describe(&ec2).await.is_none());
    }

    #[tokio::test]
    async fn test_label_format_applied() {
        let source = Arc::new(InMemorySource::with_results(vec![RawSeriesResult {
            id: "invocations".to_string(),
            timestamps: vec![at(15)],
            values: vec![12.0],
        }]));
        let engine = MetricEngine::new(source).with_label_format("%H:%M");
        let view = ResourceView::new(ResourceKind::Lambda, "checkout").unwrap();
        let batch = engine.plan(&view, window()).unwrap();

        let panels = engine.fetch_panels(&view, &batch).await.unwrap();
        assert_eq!(panels[0].series.labels(), vec!["12:15"]);
        assert_eq!(panels[0].axis.max, 12.0);
        assert_eq!(panels[0].axis.step_size, 2.0);
    }
}
