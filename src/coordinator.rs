use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::{join_messages, RequestError};
use crate::executor::QueryExecutor;
use crate::exporter::ResultExporter;
use crate::log_fetcher::LogFetcher;
use crate::request::{QueryRequest, RequestEvent};
use crate::response::ExecutionResponse;
use crate::retry::RetryPolicy;
use crate::storage::ObjectStore;

/// validate -> execute -> export -> respond. Every failure becomes a
/// response; the `query_id` is echoed whenever one exists.
pub struct ExecutionCoordinator {
    executor: QueryExecutor,
    exporter: ResultExporter,
    invocation_timeout: Option<Duration>,
}

impl ExecutionCoordinator {
    pub fn new(fetcher: Arc<dyn LogFetcher>, store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        let executor = QueryExecutor::new(fetcher, RetryPolicy::from_settings(&config.retry))
            .with_jitter_seed(config.retry.jitter_seed);
        Self {
            executor,
            exporter: ResultExporter::new(store, config),
            invocation_timeout: config.invocation_timeout(),
        }
    }

    pub async fn handle_event(&self, event: &RequestEvent) -> ExecutionResponse {
        match event.parse() {
            Ok(request) => self.run(&request).await,
            Err(err) => {
                warn!(error = %err, "rejected request envelope");
                ExecutionResponse::failed(err.to_string())
            }
        }
    }

    #[instrument(skip_all, fields(resume = request.query_id.is_some()))]
    pub async fn run(&self, request: &QueryRequest) -> ExecutionResponse {
        let deadline = self.invocation_timeout.map(|timeout| Instant::now() + timeout);

        let plan = match request.plan() {
            Ok(plan) => plan,
            Err(RequestError::Invalid(errors)) => {
                for err in &errors {
                    warn!(field = err.field(), "{err}");
                }
                return ExecutionResponse::failed(format!(
                    "bad request: {}",
                    join_messages(&errors)
                ));
            }
            Err(err) => {
                warn!(error = %err, "bad request");
                return ExecutionResponse::failed(format!("bad request: {err}"));
            }
        };

        let (handle, rows) = match self.executor.execute_until(&plan, deadline).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_retryable() => {
                info!(query_id = err.query_id().unwrap_or_default(), "{err}");
                return ExecutionResponse::retry_later(err.query_id().unwrap_or_default());
            }
            Err(err) => {
                error!(query_id = err.query_id().unwrap_or_default(), "{err}");
                return ExecutionResponse::failed(format!("failed to run query: {err}"))
                    .with_query_id(err.query_id());
            }
        };

        let destination_key = format!("{handle}.json");
        match self.exporter.export(&rows, &destination_key).await {
            Ok(exported) => {
                ExecutionResponse::success(handle.as_str(), exported.file_name, exported.file_path)
            }
            Err(err) => {
                error!(query_id = %handle, "{err}");
                ExecutionResponse::failed(format!("failed to export results: {err}"))
                    .with_query_id(Some(handle.as_str()))
            }
        }
    }
}
