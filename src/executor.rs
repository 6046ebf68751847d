use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::QueryError;
use crate::log_fetcher::{LogFetcher, LogRecord, QueryStatus};
use crate::request::{QueryHandle, QueryPlan};
use crate::retry::{jitter_rng, seed_for, RetryPolicy};

/// One row of query output, field name to value.
pub type LogEntry = BTreeMap<String, String>;

/// Rows in the order the backend returned them.
pub type ResultSet = Vec<LogEntry>;

/// Submits or resumes a query and polls it to completion.
pub struct QueryExecutor {
    fetcher: Arc<dyn LogFetcher>,
    policy: RetryPolicy,
    jitter_seed: Option<u64>,
}

impl QueryExecutor {
    pub fn new(fetcher: Arc<dyn LogFetcher>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            jitter_seed: None,
        }
    }

    pub fn with_jitter_seed(mut self, seed: Option<u64>) -> Self {
        self.jitter_seed = seed;
        self
    }

    pub async fn execute(&self, plan: &QueryPlan) -> Result<(QueryHandle, ResultSet), QueryError> {
        self.execute_until(plan, None).await
    }

    /// Like [`execute`](Self::execute), but gives up at `deadline`. Once a
    /// handle exists, running out of time is reported as retryable.
    pub async fn execute_until(
        &self,
        plan: &QueryPlan,
        deadline: Option<Instant>,
    ) -> Result<(QueryHandle, ResultSet), QueryError> {
        let handle = match within(deadline, self.acquire(plan)).await {
            Some(handle) => handle?,
            None => return Err(QueryError::SubmitDeadlineExceeded),
        };

        match within(deadline, self.wait_for_results(&handle)).await {
            Some(results) => results.map(|rows| (handle, rows)),
            None => {
                warn!(query_id = %handle, "deadline reached while polling");
                Err(QueryError::DeadlineExceeded {
                    query_id: handle.into_string(),
                })
            }
        }
    }

    /// Reuses the handle of a resumption, otherwise submits a new query.
    /// Submission failures are not retried.
    pub async fn acquire(&self, plan: &QueryPlan) -> Result<QueryHandle, QueryError> {
        match plan {
            QueryPlan::Resume(handle) => {
                info!(query_id = %handle, "resuming query");
                Ok(handle.clone())
            }
            QueryPlan::Fresh(params) => {
                let query_id = self
                    .fetcher
                    .start_query(params)
                    .await
                    .map_err(QueryError::Submit)?;
                info!(
                    query_id = %query_id,
                    log_groups = params.log_group_names.len(),
                    start = params.start_epoch,
                    end = params.end_epoch,
                    "query started"
                );
                Ok(QueryHandle::new(query_id))
            }
        }
    }

    pub async fn wait_for_results(&self, handle: &QueryHandle) -> Result<ResultSet, QueryError> {
        let mut rng = jitter_rng(self.jitter_seed.map(|seed| seed_for(seed, handle.as_str())));
        let mut attempt: u32 = 0;

        loop {
            let results = self
                .fetcher
                .get_query_results(handle.as_str())
                .await
                .map_err(|source| QueryError::Poll {
                    query_id: handle.to_string(),
                    source,
                })?;

            match results.status {
                QueryStatus::Complete => {
                    info!(query_id = %handle, rows = results.rows.len(), "query complete");
                    return Ok(to_result_set(results.rows));
                }
                status if status.is_pending() => {
                    attempt += 1;
                    if self.policy.exhausted(attempt) {
                        info!(query_id = %handle, %status, attempt, "retry budget spent, handing back");
                        return Err(QueryError::StillRunning {
                            query_id: handle.to_string(),
                            status: status.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.policy.next_delay(attempt - 1, &mut rng);
                    debug!(
                        query_id = %handle,
                        %status,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "query not finished, backing off"
                    );
                    sleep(delay).await;
                }
                status => {
                    warn!(query_id = %handle, %status, "query ended without results");
                    return Err(QueryError::UnexpectedStatus {
                        query_id: handle.to_string(),
                        status: status.to_string(),
                    });
                }
            }
        }
    }
}

async fn within<F: Future>(deadline: Option<Instant>, future: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

/// Pairs each field name with its value. Unnamed fields are dropped.
pub fn to_result_set(rows: Vec<LogRecord>) -> ResultSet {
    rows.into_iter()
        .map(|record| {
            record
                .into_iter()
                .filter_map(|field| field.name.map(|name| (name, field.value)))
                .collect::<LogEntry>()
        })
        .collect()
}
