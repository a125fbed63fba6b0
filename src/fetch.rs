use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::metrics::FetchTimer;
use crate::models::{QueryBatch, RawSeriesResult};
use crate::source::MetricsSource;
use crate::{DashboardError, Result};

/// One result per requested id, keyed by id.
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub batch_id: Uuid,
    pub results: HashMap<String, RawSeriesResult>,
}

impl FetchedBatch {
    /// Takes the result for `id`; ids the source omitted come back empty.
    pub fn take(&mut self, id: &str) -> RawSeriesResult {
        self.results
            .remove(id)
            .unwrap_or_else(|| RawSeriesResult::empty(id))
    }
}

/// Submits query batches to the metrics source. No retries, no caching.
#[derive(Clone)]
pub struct MetricFetcher {
    source: Arc<dyn MetricsSource>,
}

impl MetricFetcher {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(&self, batch: &QueryBatch, resource: &str) -> Result<FetchedBatch> {
        let _timer = FetchTimer::new(resource);

        let raw = self
            .source
            .get_metric_data(&batch.queries, &batch.window)
            .await
            .map_err(|e| {
                error!(batch_id = %batch.id, resource, kind = %e.kind, "Metric fetch failed: {}", e.message);
                crate::metrics::record_fetch_failure(resource, e.kind.as_str());
                DashboardError::FetchFailure {
                    batch_id: batch.id,
                    kind: e.kind,
                    message: e.message,
                }
            })?;

        let mut results: HashMap<String, RawSeriesResult> = batch
            .ids()
            .map(|id| (id.to_string(), RawSeriesResult::empty(id)))
            .collect();

        let returned = raw.len();
        for result in raw {
            match results.get_mut(&result.id) {
                Some(slot) if slot.timestamps.is_empty() && slot.values.is_empty() => {
                    *slot = result;
                }
                Some(slot) => {
                    // Same id twice: keep pairs in delivery order.
                    slot.timestamps.extend(result.timestamps);
                    slot.values.extend(result.values);
                }
                None => debug!(batch_id = %batch.id, id = %result.id, "Ignoring result for unrequested id"),
            }
        }

        info!(
            batch_id = %batch.id,
            resource,
            requested = batch.queries.len(),
            returned,
            "Fetched metric batch"
        );

        Ok(FetchedBatch {
            batch_id: batch.id,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ResourceKind;
    use crate::error::FetchFailureKind;
    use crate::query::{QueryBuilder, ResourceView};
    use crate::source::memory::InMemorySource;
    use crate::source::SourceError;
    use crate::models::TimeWindow;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn batch() -> QueryBatch {
        let view = ResourceView::new(ResourceKind::Ec2, "i-123").unwrap();
        let end = Utc.with_ymd_and_hms(2024, 4, 2, 10, 0, 0).unwrap();
        let window = TimeWindow::ending_at(end, Duration::from_secs(3600)).unwrap();
        QueryBuilder::for_view(&view).unwrap().build(window).unwrap()
    }

    fn series(id: &str, value: f64) -> RawSeriesResult {
        RawSeriesResult {
            id: id.to_string(),
            timestamps: vec![Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap()],
            values: vec![value],
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_id_becomes_empty() {
        let source = Arc::new(InMemorySource::with_results(vec![
            series("networkOut", 2.0),
            series("cpu", 40.0),
        ]));
        let fetcher = MetricFetcher::new(source.clone());
        let batch = batch();

        let mut fetched = fetcher.fetch(&batch, "ec2").await.unwrap();
        assert_eq!(fetched.batch_id, batch.id);
        assert_eq!(fetched.results.len(), 3);
        assert_eq!(fetched.take("cpu").values, vec![40.0]);
        assert_eq!(fetched.take("networkIn"), RawSeriesResult::empty("networkIn"));
        assert_eq!(source.calls(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_unrequested_ids_dropped() {
        let source = Arc::new(InMemorySource::new());
        source.push_response(Ok(vec![series("cpu", 1.0), series("diskReads", 5.0)]));
        let fetcher = MetricFetcher::new(source);

        let fetched = fetcher.fetch(&batch(), "ec2").await.unwrap();
        assert!(!fetched.results.contains_key("diskReads"));
    }

    #[test_log::test(tokio::test)]
    async fn test_failure_tagged_with_batch() {
        let source = Arc::new(InMemorySource::new());
        source.push_failure(SourceError::throttled("Rate exceeded"));
        let fetcher = MetricFetcher::new(source);
        let batch = batch();

        match fetcher.fetch(&batch, "ec2").await {
            Err(DashboardError::FetchFailure { batch_id, kind, .. }) => {
                assert_eq!(batch_id, batch.id);
                assert_eq!(kind, FetchFailureKind::Throttled);
            }
            other => panic!("expected fetch failure, got {:?}", other),
        }
    }
}
