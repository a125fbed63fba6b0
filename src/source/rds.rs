use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rds::types::DbInstance;
use chrono::{DateTime, Utc};

use super::cloudwatch::classify_sdk_error;
use super::{InstanceDescriber, SourceError};
use crate::models::InstanceInfo;

#[derive(Debug, Clone)]
pub struct RdsDescriber {
    client: aws_sdk_rds::Client,
}

impl RdsDescriber {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_rds::Client::new(config),
        }
    }
}

#[async_trait]
impl InstanceDescriber for RdsDescriber {
    async fn describe_instance(
        &self,
        identifier: &str,
    ) -> Result<Option<InstanceInfo>, SourceError> {
        let output = self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(output
            .db_instances()
            .first()
            .map(|instance| to_instance_info(identifier, instance)))
    }
}

fn to_instance_info(identifier: &str, instance: &DbInstance) -> InstanceInfo {
    let endpoint = instance.endpoint();
    InstanceInfo {
        identifier: instance
            .db_instance_identifier()
            .unwrap_or(identifier)
            .to_string(),
        engine: instance.engine().map(str::to_string),
        engine_version: instance.engine_version().map(str::to_string),
        instance_class: instance.db_instance_class().map(str::to_string),
        allocated_storage_gb: instance.allocated_storage().map(i64::from),
        endpoint_address: endpoint.and_then(|e| e.address()).map(str::to_string),
        endpoint_port: endpoint.and_then(|e| e.port()),
        status: instance.db_instance_status().map(str::to_string),
        created_at: instance.instance_create_time().and_then(|t| {
            t.to_millis()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
        }),
        backup_retention_days: instance.backup_retention_period(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_rds::primitives::DateTime as AwsDateTime;
    use aws_sdk_rds::types::Endpoint;

    #[test]
    fn test_instance_mapping() {
        let instance = DbInstance::builder()
            .db_instance_identifier("orders-db")
            .engine("mysql")
            .engine_version("8.0.35")
            .db_instance_class("db.m5.large")
            .allocated_storage(100)
            .endpoint(Endpoint::builder().address("orders-db.internal").port(3306).build())
            .db_instance_status("available")
            .instance_create_time(AwsDateTime::from_secs(1_700_000_000))
            .backup_retention_period(14)
            .build();

        let info = to_instance_info("orders-db", &instance);
        assert_eq!(info.engine.as_deref(), Some("mysql"));
        assert_eq!(info.allocated_storage_gb, Some(100));
        assert_eq!(info.endpoint_port, Some(3306));
        assert_eq!(info.backup_retention_days, Some(14));
        assert_eq!(
            info.created_at.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_sparse_instance() {
        let info = to_instance_info("replica-2", &DbInstance::builder().build());
        assert_eq!(info.identifier, "replica-2");
        assert_eq!(info.endpoint_address, None);
        assert_eq!(info.rows().len(), 8);
    }
}
