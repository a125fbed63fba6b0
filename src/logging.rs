use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{DashboardError, Result};

/// Sets up the logging subscriber for the application.
///
/// `RUST_LOG` wins when set; otherwise `component` and this crate log at INFO.
///
/// # Arguments
/// * `component` - Target name of the binary's own log lines
/// * `json` - Emit one JSON object per line instead of the compact format
pub fn init_logger(component: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},{}={}",
            component,
            Level::INFO,
            env!("CARGO_CRATE_NAME"),
            Level::INFO
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_level(true)
                    .compact(),
            )
            .try_init()
    };

    result.map_err(|e| DashboardError::Internal(format!("Failed to initialize logger: {}", e)))
}
