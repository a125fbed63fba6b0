use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::catalog::ResourceKind;
use crate::engine::{ChartPanel, MetricEngine};
use crate::metrics;
use crate::models::{InfoRow, InstanceInfo, TimeWindow};
use crate::query::ResourceView;
use crate::retry::RetryPolicy;
use crate::Result;

const DEFAULT_DESCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What a view currently displays.
#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub resource: ResourceKind,
    pub identifier: String,
    pub title: &'static str,
    /// Generation of the refresh whose panels are shown; 0 before the first one lands.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub panels: Vec<ChartPanel>,
    pub instance_info: Option<InstanceInfo>,
    pub info_rows: Vec<InfoRow>,
    pub last_error: Option<String>,
}

struct DisplayInner {
    panels_generation: u64,
    error_generation: u64,
    info_generation: u64,
    refreshed_at: Option<DateTime<Utc>>,
    panels: Vec<ChartPanel>,
    instance_info: Option<InstanceInfo>,
    last_error: Option<String>,
}

/// Per-view display slots, overwritten wholesale by the newest completed refresh.
pub struct DisplayState {
    inner: RwLock<DisplayInner>,
}

impl DisplayState {
    fn new() -> Self {
        Self {
            inner: RwLock::new(DisplayInner {
                panels_generation: 0,
                error_generation: 0,
                info_generation: 0,
                refreshed_at: None,
                panels: Vec::new(),
                instance_info: None,
                last_error: None,
            }),
        }
    }

    /// Returns false when a newer generation is already displayed.
    fn apply_panels(&self, generation: u64, panels: Vec<ChartPanel>) -> bool {
        let mut inner = self.inner.write();
        if generation <= inner.panels_generation {
            return false;
        }
        inner.panels = panels;
        inner.panels_generation = generation;
        inner.refreshed_at = Some(Utc::now());
        if generation > inner.error_generation {
            inner.last_error = None;
        }
        true
    }

    fn apply_failure(&self, generation: u64, message: String) -> bool {
        let mut inner = self.inner.write();
        if generation <= inner.panels_generation || generation <= inner.error_generation {
            return false;
        }
        inner.last_error = Some(message);
        inner.error_generation = generation;
        true
    }

    fn apply_instance(&self, generation: u64, info: Option<InstanceInfo>) {
        let mut inner = self.inner.write();
        if generation > inner.info_generation {
            inner.instance_info = info;
            inner.info_generation = generation;
        }
    }

    fn snapshot(&self, view: &ResourceView) -> ViewSnapshot {
        let inner = self.inner.read();
        ViewSnapshot {
            resource: view.resource,
            identifier: view.identifier.clone(),
            title: view.descriptor().title,
            generation: inner.panels_generation,
            refreshed_at: inner.refreshed_at,
            panels: inner.panels.clone(),
            instance_info: inner.instance_info.clone(),
            info_rows: inner
                .instance_info
                .as_ref()
                .map(InstanceInfo::rows)
                .unwrap_or_default(),
            last_error: inner.last_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Applied { generation: u64 },
    /// Completed after a newer refresh had already been applied.
    Stale { generation: u64 },
}

/// Re-runs the pipeline for one view, on a timer and on demand.
///
/// Every refresh takes a generation number when it starts. Its result only
/// replaces the displayed state if no later-started refresh has been applied
/// yet, so a slow response can never overwrite a newer one.
pub struct RefreshScheduler {
    engine: Arc<MetricEngine>,
    view: ResourceView,
    interval: Duration,
    retry: RetryPolicy,
    describe_timeout: Duration,
    next_generation: AtomicU64,
    state: DisplayState,
}

impl RefreshScheduler {
    pub fn new(
        engine: Arc<MetricEngine>,
        view: ResourceView,
        interval: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            view,
            interval,
            retry,
            describe_timeout: DEFAULT_DESCRIBE_TIMEOUT,
            next_generation: AtomicU64::new(0),
            state: DisplayState::new(),
        }
    }

    /// Upper bound on the instance describe call of each refresh.
    pub fn with_describe_timeout(mut self, timeout: Duration) -> Self {
        self.describe_timeout = timeout;
        self
    }

    pub fn view(&self) -> &ResourceView {
        &self.view
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.state.snapshot(&self.view)
    }

    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let resource = self.view.resource.as_str();

        let engine = self.engine.as_ref();
        let view = &self.view;
        let retry = self.retry;

        // Panels land as soon as their own branch finishes; a slow describe
        // only delays the return value, bounded by describe_timeout.
        let panels = async move {
            let fetched = async {
                let window = TimeWindow::last(view.window)?;
                let batch = engine.plan(view, window)?;
                let batch = &batch;
                retry
                    .run(resource, move || engine.fetch_panels(view, batch))
                    .await
            }
            .await;
            self.finish_refresh(generation, fetched)
        };

        let instance = async move {
            match tokio::time::timeout(self.describe_timeout, engine.describe(view)).await {
                Ok(Some(Ok(info))) => self.state.apply_instance(generation, info),
                Ok(Some(Err(e))) => {
                    warn!(resource, generation, kind = %e.kind, "Instance describe failed: {}", e.message);
                }
                Ok(None) => {}
                Err(_) => {
                    warn!(
                        resource,
                        generation,
                        timeout_ms = self.describe_timeout.as_millis() as u64,
                        "Instance describe timed out, keeping previous info"
                    );
                }
            }
        };

        let (outcome, ()) = futures::join!(panels, instance);
        outcome
    }

    fn finish_refresh(
        &self,
        generation: u64,
        fetched: Result<Vec<ChartPanel>>,
    ) -> Result<RefreshOutcome> {
        let resource = self.view.resource.as_str();
        match fetched {
            Ok(panels) => {
                if self.state.apply_panels(generation, panels) {
                    metrics::set_applied_generation(resource, generation);
                    info!(resource, generation, "Refresh applied");
                    Ok(RefreshOutcome::Applied { generation })
                } else {
                    metrics::record_stale_result(resource);
                    debug!(resource, generation, "Discarding stale refresh result");
                    Ok(RefreshOutcome::Stale { generation })
                }
            }
            Err(err) => {
                // Fetch failures are logged at error level by the fetcher, with the batch id.
                debug!(resource, generation, "Refresh failed, keeping previous data: {}", err);
                self.state.apply_failure(generation, err.to_string());
                Err(err)
            }
        }
    }

    /// Starts the periodic timer. The first tick fires immediately and every
    /// tick's refresh runs as its own task, so slow fetches may overlap.
    pub fn spawn(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);

        let join = tokio::spawn(async move {
            let resource = scheduler.view.resource;
            let mut ticker = tokio::time::interval(scheduler.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduler = Arc::clone(&scheduler);
                        tokio::spawn(async move {
                            if let Err(e) = scheduler.refresh().await {
                                debug!(resource = %scheduler.view.resource, "Periodic refresh failed: {}", e);
                            }
                        });
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!(%resource, "Refresh timer stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

/// Stops the periodic timer of a spawned scheduler. In-flight refreshes run to completion.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!("Refresh timer task ended abnormally: {}", e);
        }
    }
}
