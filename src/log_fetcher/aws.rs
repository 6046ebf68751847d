use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use aws_sdk_cloudwatchlogs::types::QueryStatus as CwlQueryStatus;
use aws_sdk_cloudwatchlogs::Client;
use aws_types::SdkConfig;

use super::{LogFetcher, LogField, LogRecord, QueryParams, QueryResults, QueryStatus};
use crate::error::BackendError;

/// CloudWatch Logs Insights backend.
#[derive(Clone)]
pub struct AwsLogFetcher {
    client: Client,
}

impl AwsLogFetcher {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl LogFetcher for AwsLogFetcher {
    async fn start_query(&self, params: &QueryParams) -> Result<String, BackendError> {
        let response = self
            .client
            .start_query()
            .set_log_group_names(Some(params.log_group_names.clone()))
            .query_string(params.query.clone())
            .start_time(params.start_epoch)
            .end_time(params.end_epoch)
            .limit(params.limit)
            .send()
            .await
            .map_err(|err| BackendError::Request(DisplayErrorContext(&err).to_string()))?;

        response
            .query_id()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or(BackendError::MissingField("queryId"))
    }

    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults, BackendError> {
        let response = self
            .client
            .get_query_results()
            .query_id(query_id)
            .send()
            .await
            .map_err(|err| BackendError::Request(DisplayErrorContext(&err).to_string()))?;

        let status = match response.status() {
            Some(CwlQueryStatus::Scheduled) => QueryStatus::Scheduled,
            Some(CwlQueryStatus::Running) => QueryStatus::Running,
            Some(CwlQueryStatus::Complete) => QueryStatus::Complete,
            Some(CwlQueryStatus::Failed) => QueryStatus::Failed,
            Some(CwlQueryStatus::Cancelled) => QueryStatus::Cancelled,
            Some(other) => QueryStatus::Unknown(other.as_str().to_string()),
            None => QueryStatus::Unknown(String::new()),
        };

        let mut rows = Vec::new();
        if status == QueryStatus::Complete {
            for row in response.results() {
                let record = row
                    .iter()
                    .map(|field| LogField {
                        name: field.field().map(|s| s.to_string()),
                        value: field.value().unwrap_or_default().to_string(),
                    })
                    .collect::<LogRecord>();
                rows.push(record);
            }
        }

        Ok(QueryResults { status, rows })
    }
}
