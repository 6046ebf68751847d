use std::fmt;

use async_trait::async_trait;

use crate::error::BackendError;

pub mod aws;
pub mod fake;

pub use aws::AwsLogFetcher;
pub use fake::FakeLogFetcher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pub log_group_names: Vec<String>,
    pub query: String,
    pub start_epoch: i64,
    pub end_epoch: i64,
    pub limit: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogField {
    pub name: Option<String>,
    pub value: String,
}

pub type LogRecord = Vec<LogField>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    /// Anything else the backend reports, with its raw label.
    Unknown(String),
}

impl QueryStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryStatus::Scheduled | QueryStatus::Running)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStatus::Scheduled => f.write_str("Scheduled"),
            QueryStatus::Running => f.write_str("Running"),
            QueryStatus::Complete => f.write_str("Complete"),
            QueryStatus::Failed => f.write_str("Failed"),
            QueryStatus::Cancelled => f.write_str("Cancelled"),
            QueryStatus::Unknown(label) if label.is_empty() => f.write_str("Unknown"),
            QueryStatus::Unknown(label) => write!(f, "Unknown({label})"),
        }
    }
}

/// One status poll. `rows` is only meaningful once the query is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResults {
    pub status: QueryStatus,
    pub rows: Vec<LogRecord>,
}

#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn start_query(&self, params: &QueryParams) -> Result<String, BackendError>;
    async fn get_query_results(&self, query_id: &str) -> Result<QueryResults, BackendError>;
}
