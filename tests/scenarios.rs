use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logs_query_exec::config::Config;
use logs_query_exec::error::BackendError;
use logs_query_exec::executor::ResultSet;
use logs_query_exec::log_fetcher::fake::field;
use logs_query_exec::log_fetcher::{
    FakeLogFetcher, LogFetcher, LogRecord, QueryParams, QueryResults, QueryStatus,
};
use logs_query_exec::storage::MemoryObjectStore;
use logs_query_exec::{ExecutionCoordinator, QueryRequest, RequestEvent, ResponseStatus};

fn config(scratch: &Path, max_attempts: u32) -> Config {
    let mut config = Config::default();
    config.aws.s3_bucket = "exports".into();
    config.aws.s3_object_key_prefix = "insights".into();
    config.temporary_directory = Some(scratch.to_path_buf());
    config.retry.max_attempts = max_attempts;
    config.retry.jitter_seed = Some(11);
    config
}

fn fresh_request() -> QueryRequest {
    QueryRequest {
        log_group_names: vec!["/aws/lambda/api".into()],
        query_string: Some("fields @timestamp, @message | sort @timestamp asc".into()),
        start_time: Some(1_700_000_000),
        end_time: Some(1_700_086_400),
        limit: Some(1000),
        ..QueryRequest::default()
    }
}

fn two_rows() -> Vec<LogRecord> {
    vec![
        vec![
            field("@timestamp", "2025-03-01 10:00:00.000"),
            field("@message", "first"),
        ],
        vec![
            field("@timestamp", "2025-03-01 10:00:01.000"),
            field("@message", "second"),
        ],
    ]
}

fn scratch_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

#[tokio::test(start_paused = true)]
async fn complete_on_first_poll_exports_once() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        FakeLogFetcher::scripted([QueryStatus::Complete], two_rows()).with_query_id("q-a"),
    );
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 5));

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert!(!response.enable_retry);
    assert_eq!(response.query_id, "q-a");
    assert_eq!(response.file_name, "q-a.json");
    assert_eq!(response.file_path, "exports/insights/q-a.json");
    assert!(response.error_message.is_empty());

    let objects = store.objects();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].key, "insights/q-a.json");
    let rows: ResultSet = serde_json::from_slice(&objects[0].body).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["@message"], "first");
    assert_eq!(rows[1]["@message"], "second");

    assert_eq!(fetcher.start_calls(), 1);
    assert_eq!(fetcher.poll_calls(), 1);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test(start_paused = true)]
async fn still_running_after_budget_asks_for_retry() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher =
        Arc::new(FakeLogFetcher::scripted([QueryStatus::Running], Vec::new()).with_query_id("q-b"));
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 3));

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.enable_retry);
    assert_eq!(response.query_id, "q-b");
    assert!(response.error_message.is_empty());
    assert_eq!(fetcher.poll_calls(), 3);
    assert_eq!(store.put_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_status_is_permanent() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher =
        Arc::new(FakeLogFetcher::scripted([QueryStatus::Failed], Vec::new()).with_query_id("q-c"));
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 5));

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(!response.enable_retry);
    assert!(!response.error_message.is_empty());
    assert_eq!(response.query_id, "q-c");
    assert_eq!(fetcher.poll_calls(), 1);
    assert_eq!(store.put_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn resumption_skips_submission() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FakeLogFetcher::scripted([QueryStatus::Complete], two_rows()));
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 5));

    let response = coordinator.run(&QueryRequest::resume("q-d")).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.query_id, "q-d");
    assert_eq!(response.file_name, "q-d.json");
    assert_eq!(fetcher.start_calls(), 0);
    assert_eq!(fetcher.poll_calls(), 1);
    assert_eq!(store.objects().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn upload_failure_is_permanent_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        FakeLogFetcher::scripted([QueryStatus::Complete], two_rows()).with_query_id("q-e"),
    );
    let store = Arc::new(MemoryObjectStore::failing("AccessDenied: s3:PutObject"));
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 5));

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(!response.enable_retry);
    assert_eq!(response.query_id, "q-e");
    assert!(response.error_message.contains("AccessDenied"));
    assert_eq!(store.put_attempts(), 1);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn invalid_request_lists_every_problem() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FakeLogFetcher::new());
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 5));

    let mut request = fresh_request();
    request.log_group_names.clear();
    request.limit = None;
    let response = coordinator.run(&request).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(!response.enable_retry);
    assert!(response.query_id.is_empty());
    assert!(response.error_message.contains("log_group_names is required"));
    assert!(response.error_message.contains("limit is required"));
    assert_eq!(fetcher.start_calls(), 0);
}

#[tokio::test]
async fn submission_failure_reports_no_query_id() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FakeLogFetcher::new().failing_start("MalformedQueryException"));
    let coordinator = ExecutionCoordinator::new(
        fetcher.clone(),
        Arc::new(MemoryObjectStore::new()),
        &config(scratch.path(), 5),
    );

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(!response.enable_retry);
    assert!(response.query_id.is_empty());
    assert!(response.error_message.contains("MalformedQueryException"));
    assert_eq!(fetcher.poll_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_hands_back_the_query_id() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher =
        Arc::new(FakeLogFetcher::scripted([QueryStatus::Running], Vec::new()).with_query_id("q-t"));
    let mut config = config(scratch.path(), 100);
    config.invocation_timeout_secs = Some(5);
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), Arc::new(MemoryObjectStore::new()), &config);

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.enable_retry);
    assert_eq!(response.query_id, "q-t");
}

#[tokio::test(start_paused = true)]
async fn encoded_envelope_runs_end_to_end() {
    let scratch = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(
        FakeLogFetcher::scripted(
            [QueryStatus::Scheduled, QueryStatus::Complete],
            two_rows(),
        )
        .with_query_id("q-env"),
    );
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator =
        ExecutionCoordinator::new(fetcher.clone(), store.clone(), &config(scratch.path(), 5));

    let event = RequestEvent::encode(&fresh_request()).unwrap();
    let response = coordinator.handle_event(&event).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(fetcher.submitted()[0].log_group_names, vec!["/aws/lambda/api"]);
    assert_eq!(fetcher.submitted()[0].limit, 1000);
}

#[tokio::test]
async fn garbled_envelope_is_a_failed_response() {
    let scratch = tempfile::tempdir().unwrap();
    let coordinator = ExecutionCoordinator::new(
        Arc::new(FakeLogFetcher::new()),
        Arc::new(MemoryObjectStore::new()),
        &config(scratch.path(), 5),
    );
    let event = RequestEvent {
        body: "***".into(),
        is_base64_encoded: true,
    };

    let response = coordinator.handle_event(&event).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(!response.enable_retry);
    assert!(!response.error_message.is_empty());
}

/// Backend whose submission never answers within an invocation.
struct StalledSubmit;

#[async_trait]
impl LogFetcher for StalledSubmit {
    async fn start_query(&self, _params: &QueryParams) -> Result<String, BackendError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok("q-late".into())
    }

    async fn get_query_results(&self, _query_id: &str) -> Result<QueryResults, BackendError> {
        Ok(QueryResults {
            status: QueryStatus::Complete,
            rows: Vec::new(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_during_submission_is_permanent() {
    let scratch = tempfile::tempdir().unwrap();
    let mut config = config(scratch.path(), 5);
    config.invocation_timeout_secs = Some(5);
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator = ExecutionCoordinator::new(Arc::new(StalledSubmit), store.clone(), &config);

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(!response.enable_retry);
    assert!(response.query_id.is_empty());
    assert!(!response.error_message.is_empty());
    assert_eq!(store.put_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_local_retention_still_succeeds() {
    let scratch = tempfile::tempdir().unwrap();
    fs::create_dir(scratch.path().join("q-9.json")).unwrap();
    let fetcher = Arc::new(
        FakeLogFetcher::scripted([QueryStatus::Complete], two_rows()).with_query_id("q-9"),
    );
    let store = Arc::new(MemoryObjectStore::new());
    let mut config = config(scratch.path(), 5);
    config.delete_processed_file = false;
    let coordinator = ExecutionCoordinator::new(fetcher, store.clone(), &config);

    let response = coordinator.run(&fresh_request()).await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(response.file_name, "q-9.json");
    assert!(response.error_message.is_empty());
    assert_eq!(store.objects().len(), 1);
}
