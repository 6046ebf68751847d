use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{LogFetcher, LogField, LogRecord, QueryParams, QueryResults, QueryStatus};
use crate::error::BackendError;

/// In-process backend. Plays back a script of statuses, one per poll; the
/// last status repeats once the script runs out.
pub struct FakeLogFetcher {
    query_id: String,
    script: Mutex<VecDeque<QueryStatus>>,
    rows: Arc<Vec<LogRecord>>,
    start_error: Option<String>,
    poll_error: Option<String>,
    start_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    submitted: Mutex<Vec<QueryParams>>,
}

impl Default for FakeLogFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLogFetcher {
    /// Synthetic data set that completes on the third poll.
    pub fn new() -> Self {
        Self::scripted(
            [
                QueryStatus::Scheduled,
                QueryStatus::Running,
                QueryStatus::Complete,
            ],
            build_fake_records(40),
        )
    }

    pub fn scripted(statuses: impl IntoIterator<Item = QueryStatus>, rows: Vec<LogRecord>) -> Self {
        Self {
            query_id: "fake-query-0001".into(),
            script: Mutex::new(statuses.into_iter().collect()),
            rows: Arc::new(rows),
            start_error: None,
            poll_error: None,
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = query_id.into();
        self
    }

    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    pub fn failing_poll(mut self, message: impl Into<String>) -> Self {
        self.poll_error = Some(message.into());
        self
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<QueryParams> {
        self.submitted
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn next_status(&self) -> QueryStatus {
        let Ok(mut script) = self.script.lock() else {
            return QueryStatus::Unknown("poisoned".into());
        };
        match script.len() {
            0 => QueryStatus::Complete,
            1 => script[0].clone(),
            _ => script.pop_front().unwrap_or(QueryStatus::Complete),
        }
    }
}

#[async_trait]
impl LogFetcher for FakeLogFetcher {
    async fn start_query(&self, params: &QueryParams) -> Result<String, BackendError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.start_error {
            return Err(BackendError::Request(message.clone()));
        }
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(params.clone());
        }
        Ok(self.query_id.clone())
    }

    async fn get_query_results(&self, _query_id: &str) -> Result<QueryResults, BackendError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.poll_error {
            return Err(BackendError::Request(message.clone()));
        }
        let status = self.next_status();
        let rows = if status == QueryStatus::Complete {
            (*self.rows).clone()
        } else {
            Vec::new()
        };
        Ok(QueryResults { status, rows })
    }
}

pub fn field(name: &str, value: impl Into<String>) -> LogField {
    LogField {
        name: Some(name.to_string()),
        value: value.into(),
    }
}

pub fn build_fake_records(count: usize) -> Vec<LogRecord> {
    let levels = ["DEBUG", "INFO", "WARN", "ERROR"];
    let streams = [
        "2025/03/01/[$LATEST]auth",
        "2025/03/01/[$LATEST]billing",
        "2025/03/01/[$LATEST]reporting",
    ];
    let messages = [
        "handled request",
        "cache miss",
        "retrying upstream call",
        "persisted batch",
    ];

    (0..count)
        .map(|idx| {
            let level = levels[(idx * 7) % levels.len()];
            let stream = streams[idx % streams.len()];
            let message = messages[(idx * 3) % messages.len()];
            vec![
                field("@timestamp", synthetic_timestamp(idx)),
                field("@logStream", stream),
                field(
                    "@message",
                    format!("{level} {message} request_id=req-{idx:05}"),
                ),
                field("@ptr", format!("ptr-{idx:08x}")),
            ]
        })
        .collect()
}

fn synthetic_timestamp(idx: usize) -> String {
    let hour = (idx * 5) % 24;
    let minute = (idx * 7) % 60;
    let second = (idx * 11) % 60;
    let millis = (idx * 37) % 1000;
    format!("2025-03-01 {hour:02}:{minute:02}:{second:02}.{millis:03}")
}
