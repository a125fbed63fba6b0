use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{InstanceDescriber, MetricsSource, SourceError};
use crate::models::{InstanceInfo, MetricQuerySpec, RawSeriesResult, TimeWindow};

type Response = Result<Vec<RawSeriesResult>, SourceError>;

/// Scripted in-process source.
///
/// Queued responses are served first, one per call; once the queue is empty
/// every call returns the default results filtered to the requested ids.
#[derive(Default)]
pub struct InMemorySource {
    defaults: Mutex<Vec<RawSeriesResult>>,
    queued: Mutex<VecDeque<Response>>,
    instances: Mutex<HashMap<String, InstanceInfo>>,
    describe_failure: Mutex<Option<SourceError>>,
    requests: Mutex<Vec<(Vec<MetricQuerySpec>, TimeWindow)>>,
    calls: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<RawSeriesResult>) -> Self {
        let source = Self::new();
        *source.defaults.lock() = results;
        source
    }

    pub fn set_results(&self, results: Vec<RawSeriesResult>) {
        *self.defaults.lock() = results;
    }

    pub fn push_response(&self, response: Response) {
        self.queued.lock().push_back(response);
    }

    pub fn push_failure(&self, error: SourceError) {
        self.push_response(Err(error));
    }

    pub fn insert_instance(&self, info: InstanceInfo) {
        self.instances.lock().insert(info.identifier.clone(), info);
    }

    pub fn fail_describe(&self, error: Option<SourceError>) {
        *self.describe_failure.lock() = error;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Vec<MetricQuerySpec>, TimeWindow)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MetricsSource for InMemorySource {
    async fn get_metric_data(
        &self,
        queries: &[MetricQuerySpec],
        window: &TimeWindow,
    ) -> Result<Vec<RawSeriesResult>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((queries.to_vec(), *window));

        if let Some(response) = self.queued.lock().pop_front() {
            return response;
        }

        let defaults = self.defaults.lock();
        Ok(defaults
            .iter()
            .filter(|r| queries.iter().any(|q| q.id == r.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InstanceDescriber for InMemorySource {
    async fn describe_instance(
        &self,
        identifier: &str,
    ) -> Result<Option<InstanceInfo>, SourceError> {
        if let Some(error) = self.describe_failure.lock().clone() {
            return Err(error);
        }
        Ok(self.instances.lock().get(identifier).cloned())
    }
}
