use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudwatch::config::Credentials;
use aws_sdk_cloudwatch::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{
    Dimension as AwsDimension, Metric, MetricDataQuery, MetricDataResult, MetricStat,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{MetricsSource, SourceError};
use crate::config::AwsSettings;
use crate::error::FetchFailureKind;
use crate::models::{MetricQuerySpec, RawSeriesResult, TimeWindow};

/// GetMetricData accepts at most this many queries per request.
const MAX_QUERIES_PER_REQUEST: usize = 500;

/// Builds the shared SDK configuration from explicit settings.
///
/// Static keys are only used when both halves are configured; otherwise the
/// SDK's default credential chain applies.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            None,
            None,
            "dashboard-environment",
        ));
    }

    loader.load().await
}

#[derive(Debug, Clone)]
pub struct CloudWatchSource {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchSource {
    pub fn new(config: &SdkConfig) -> Self {
        Self::from_client(aws_sdk_cloudwatch::Client::new(config))
    }

    pub fn from_client(client: aws_sdk_cloudwatch::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetricsSource for CloudWatchSource {
    async fn get_metric_data(
        &self,
        queries: &[MetricQuerySpec],
        window: &TimeWindow,
    ) -> Result<Vec<RawSeriesResult>, SourceError> {
        let start = to_aws_time(window.start);
        let end = to_aws_time(window.end);

        let mut results: Vec<RawSeriesResult> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for chunk in queries.chunks(MAX_QUERIES_PER_REQUEST) {
            let data_queries: Vec<MetricDataQuery> = chunk.iter().map(to_data_query).collect();
            let mut next_token: Option<String> = None;

            loop {
                let output = self
                    .client
                    .get_metric_data()
                    .set_metric_data_queries(Some(data_queries.clone()))
                    .start_time(start)
                    .end_time(end)
                    .set_next_token(next_token.take())
                    .send()
                    .await
                    .map_err(classify_sdk_error)?;

                for result in output.metric_data_results() {
                    merge_page(&mut results, &mut positions, result);
                }

                match output.next_token() {
                    Some(token) => {
                        debug!(queries = chunk.len(), "GetMetricData returned another page");
                        next_token = Some(token.to_string());
                    }
                    None => break,
                }
            }
        }

        Ok(results)
    }
}

fn to_data_query(spec: &MetricQuerySpec) -> MetricDataQuery {
    let dimensions = spec
        .dimensions
        .iter()
        .map(|d| AwsDimension::builder().name(&d.name).value(&d.value).build())
        .collect();

    let metric = Metric::builder()
        .namespace(&spec.namespace)
        .metric_name(&spec.metric_name)
        .set_dimensions(Some(dimensions))
        .build();

    let stat = MetricStat::builder()
        .metric(metric)
        // QueryBuilder rejects periods beyond i32::MAX.
        .period(i32::try_from(spec.period).unwrap_or(i32::MAX))
        .stat(spec.statistic.as_str())
        .build();

    MetricDataQuery::builder()
        .id(&spec.id)
        .metric_stat(stat)
        .return_data(true)
        .build()
}

/// Appends one page of a result to the series collected so far for its id.
fn merge_page(
    results: &mut Vec<RawSeriesResult>,
    positions: &mut HashMap<String, usize>,
    page: &MetricDataResult,
) {
    let Some(id) = page.id() else {
        warn!("GetMetricData result without an id, skipping");
        return;
    };

    let index = *positions.entry(id.to_string()).or_insert_with(|| {
        results.push(RawSeriesResult::empty(id));
        results.len() - 1
    });
    let series = &mut results[index];

    // An unconvertible timestamp leaves the arrays misaligned on purpose so
    // the normalizer discards the whole series instead of mis-pairing it.
    series
        .timestamps
        .extend(page.timestamps().iter().filter_map(from_aws_time));
    series.values.extend_from_slice(page.values());
}

fn to_aws_time(time: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_millis(time.timestamp_millis())
}

fn from_aws_time(time: &AwsDateTime) -> Option<DateTime<Utc>> {
    let millis = time.to_millis().ok()?;
    DateTime::<Utc>::from_timestamp_millis(millis)
}

pub(crate) fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> SourceError
where
    E: ProvideErrorMetadata + StdError + 'static,
    R: Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => FetchFailureKind::Network,
        SdkError::ServiceError(service) => kind_from_code(service.err().code()),
        _ => FetchFailureKind::Other,
    };
    SourceError::new(kind, DisplayErrorContext(err).to_string())
}

pub(crate) fn kind_from_code(code: Option<&str>) -> FetchFailureKind {
    match code {
        Some(
            "Throttling"
            | "ThrottlingException"
            | "ThrottledException"
            | "RequestLimitExceeded"
            | "TooManyRequestsException"
            | "LimitExceededException",
        ) => FetchFailureKind::Throttled,
        Some(
            "AccessDenied"
            | "AccessDeniedException"
            | "UnrecognizedClientException"
            | "InvalidClientTokenId"
            | "ExpiredToken"
            | "ExpiredTokenException"
            | "SignatureDoesNotMatch"
            | "InvalidSignatureException"
            | "MissingAuthenticationToken",
        ) => FetchFailureKind::Auth,
        Some(
            "DBInstanceNotFound"
            | "DBInstanceNotFoundFault"
            | "ResourceNotFound"
            | "ResourceNotFoundException",
        ) => FetchFailureKind::NotFound,
        _ => FetchFailureKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dimension, Statistic};
    use chrono::TimeZone;

    #[test]
    fn test_error_codes() {
        assert_eq!(kind_from_code(Some("Throttling")), FetchFailureKind::Throttled);
        assert_eq!(kind_from_code(Some("ExpiredToken")), FetchFailureKind::Auth);
        assert_eq!(kind_from_code(Some("DBInstanceNotFound")), FetchFailureKind::NotFound);
        assert_eq!(kind_from_code(Some("InternalFailure")), FetchFailureKind::Other);
        assert_eq!(kind_from_code(None), FetchFailureKind::Other);
    }

    #[test]
    fn test_time_conversion() {
        let t = Utc.with_ymd_and_hms(2024, 2, 29, 23, 55, 0).unwrap();
        assert_eq!(from_aws_time(&to_aws_time(t)), Some(t));
    }

    #[test]
    fn test_data_query_shape() {
        let spec = MetricQuerySpec {
            id: "freeStorage".to_string(),
            namespace: "AWS/RDS".to_string(),
            metric_name: "FreeStorageSpace".to_string(),
            dimensions: vec![Dimension::new("DBInstanceIdentifier", "orders-db")],
            period: 300,
            statistic: Statistic::Average,
        };

        let query = to_data_query(&spec);
        assert_eq!(query.id(), Some("freeStorage"));
        assert_eq!(query.return_data(), Some(true));

        let stat = query.metric_stat().unwrap();
        assert_eq!(stat.period(), Some(300));
        assert_eq!(stat.stat(), Some("Average"));

        let metric = stat.metric().unwrap();
        assert_eq!(metric.namespace(), Some("AWS/RDS"));
        assert_eq!(metric.dimensions().len(), 1);
        assert_eq!(metric.dimensions()[0].value(), Some("orders-db"));
    }

    #[test]
    fn test_pages_merge_by_id() {
        let t = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let page = |id: &str, minute: i64, value: f64| {
            MetricDataResult::builder()
                .id(id)
                .timestamps(to_aws_time(t + chrono::Duration::minutes(minute)))
                .values(value)
                .build()
        };

        let mut results = Vec::new();
        let mut positions = HashMap::new();
        merge_page(&mut results, &mut positions, &page("cpu", 10, 3.0));
        merge_page(&mut results, &mut positions, &page("networkIn", 10, 9.0));
        merge_page(&mut results, &mut positions, &page("cpu", 5, 2.0));

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "cpu");
        assert_eq!(results[0].values, vec![3.0, 2.0]);
        assert_eq!(results[0].timestamps.len(), 2);
        assert_eq!(results[1].values, vec![9.0]);
    }
}
