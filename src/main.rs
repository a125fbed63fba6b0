use std::env;
use std::sync::Arc;

use cloudwatch_dashboard::{
    api::{self, DashboardState},
    config::AppConfig,
    engine::MetricEngine,
    logging, metrics,
    scheduler::RefreshScheduler,
    source::{cloudwatch::{load_sdk_config, CloudWatchSource}, rds::RdsDescriber},
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging
    let json_logs = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if let Err(e) = logging::init_logger("cloudwatch_dashboard", json_logs) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    // Initialize metrics
    metrics::init_metrics();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let sdk_config = load_sdk_config(&config.aws).await;
    let engine = Arc::new(
        MetricEngine::new(Arc::new(CloudWatchSource::new(&sdk_config)))
            .with_describer(Arc::new(RdsDescriber::new(&sdk_config)))
            .with_label_format(config.label_format.clone()),
    );

    let schedulers: Vec<Arc<RefreshScheduler>> = config
        .views
        .iter()
        .map(|view| {
            info!(
                resource = %view.resource,
                identifier = %view.identifier,
                "Configured view"
            );
            Arc::new(RefreshScheduler::new(
                engine.clone(),
                view.clone(),
                config.refresh_interval,
                config.retry,
            ))
        })
        .collect();

    let handles: Vec<_> = schedulers.iter().map(|s| s.spawn()).collect();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down");
    };

    let served = api::serve(config.port, DashboardState::new(schedulers), shutdown).await;

    for handle in handles {
        handle.shutdown().await;
    }
    metrics::DASHBOARD_UP.set(0);

    if let Err(e) = served {
        error!("{}", e);
        std::process::exit(1);
    }
}
