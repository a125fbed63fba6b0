use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::catalog::ResourceKind;
use crate::models::TimeWindow;
use crate::normalize::DEFAULT_LABEL_FORMAT;
use crate::query::ResourceView;
use crate::retry::RetryPolicy;
use crate::{DashboardError, Result};

/// Region and optional static credentials for the AWS clients.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub aws: AwsSettings,
    pub port: u16,
    pub refresh_interval: Duration,
    /// Overrides every view's default window when set.
    pub window: Option<Duration>,
    pub label_format: String,
    pub retry: RetryPolicy,
    pub views: Vec<ResourceView>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let window = parse::<u64>(&get, "WINDOW_HOURS")?
            .map(window_from_hours)
            .transpose()?;

        let refresh_secs = parse::<u64>(&get, "REFRESH_INTERVAL_SECS")?.unwrap_or(300);
        if refresh_secs == 0 {
            return Err(DashboardError::Config(
                "REFRESH_INTERVAL_SECS must be positive".to_string(),
            ));
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse::<u32>(&get, "RETRY_MAX_ATTEMPTS")?
                .unwrap_or(defaults.max_attempts)
                .max(1),
            base_delay: parse::<u64>(&get, "RETRY_BASE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: defaults.max_delay,
        };

        let mut views = Vec::new();
        for resource in ResourceKind::ALL {
            if let Some(identifier) = get(identifier_var(resource)) {
                let view = ResourceView::new(resource, identifier)?;
                views.push(match window {
                    Some(window) => view.with_window(window),
                    None => view,
                });
            }
        }
        if views.is_empty() {
            return Err(DashboardError::ConfigMissing(format!(
                "at least one of {}",
                ResourceKind::ALL
                    .iter()
                    .map(|r| identifier_var(*r))
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        Ok(Self {
            aws: AwsSettings {
                region: get("AWS_REGION"),
                access_key: get("AWS_ACCESS_KEY"),
                secret_key: get("AWS_SECRET_KEY"),
            },
            port: parse::<u16>(&get, "PORT")?.unwrap_or(8080),
            refresh_interval: Duration::from_secs(refresh_secs),
            window,
            label_format: get("TIME_LABEL_FORMAT").unwrap_or_else(|| DEFAULT_LABEL_FORMAT.to_string()),
            retry,
            views,
        })
    }

    pub fn view(&self, resource: ResourceKind) -> Option<&ResourceView> {
        self.views.iter().find(|v| v.resource == resource)
    }
}

/// Environment variable holding the identifying dimension value of a resource.
pub fn identifier_var(resource: ResourceKind) -> &'static str {
    match resource {
        ResourceKind::Ec2 => "EC2_INSTANCE_ID",
        ResourceKind::Rds => "RDS_INSTANCE_ID",
        ResourceKind::S3 => "S3_BUCKET_NAME",
        ResourceKind::Lambda => "LAMBDA_FUNCTION_NAME",
    }
}

fn window_from_hours(hours: u64) -> Result<Duration> {
    if hours == 0 {
        return Err(DashboardError::Config("WINDOW_HOURS must be positive".to_string()));
    }
    let span = hours
        .checked_mul(3600)
        .map(Duration::from_secs)
        .ok_or_else(|| DashboardError::Config(format!("WINDOW_HOURS={} is out of range", hours)))?;
    // Reject spans that could never form a query window.
    TimeWindow::last(span)
        .map_err(|_| DashboardError::Config(format!("WINDOW_HOURS={} is out of range", hours)))?;
    Ok(span)
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| DashboardError::Config(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}
