use thiserror::Error;

/// A single problem with a fresh query request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: i64 },
    #[error("start_time ({start}) must not be after end_time ({end})")]
    InvertedRange { start: i64, end: i64 },
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing(field) => field,
            ValidationError::Negative { field, .. } => field,
            ValidationError::InvertedRange { .. } => "start_time",
        }
    }
}

/// Failure to turn an inbound envelope into a query request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("{}", join_messages(.0))]
    Invalid(Vec<ValidationError>),
    #[error("failed to decode base64 request body: {0}")]
    Body(#[source] base64::DecodeError),
    #[error("request body is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("failed to parse request JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to decode encoded_query_string: {0}")]
    QueryText(#[source] base64::DecodeError),
}

pub fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A call to the log backend itself failed.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("{0}")]
    Request(String),
    #[error("backend response is missing {0}")]
    MissingField(&'static str),
}

/// A call to the object store failed.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Outcome of the query phase when no result set was produced.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed StartQuery: {0}")]
    Submit(#[source] BackendError),
    #[error("failed GetQueryResults for {query_id}: {source}")]
    Poll {
        query_id: String,
        #[source]
        source: BackendError,
    },
    #[error("GetQueryResults returned status {status} for {query_id}")]
    UnexpectedStatus { query_id: String, status: String },
    #[error("query {query_id} still {status} after {attempts} attempts")]
    StillRunning {
        query_id: String,
        status: String,
        attempts: u32,
    },
    #[error("invocation deadline reached while waiting for {query_id}")]
    DeadlineExceeded { query_id: String },
    #[error("invocation deadline reached before the query was submitted")]
    SubmitDeadlineExceeded,
}

impl QueryError {
    /// Whether the caller should invoke again with the same `query_id`.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::StillRunning { .. } | QueryError::DeadlineExceeded { .. }
        )
    }

    /// The backend handle, if one had been obtained when the error happened.
    pub fn query_id(&self) -> Option<&str> {
        match self {
            QueryError::Submit(_) | QueryError::SubmitDeadlineExceeded => None,
            QueryError::Poll { query_id, .. }
            | QueryError::UnexpectedStatus { query_id, .. }
            | QueryError::StillRunning { query_id, .. }
            | QueryError::DeadlineExceeded { query_id } => Some(query_id),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to stage results in {path}: {source}")]
    Stage {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed PutObject s3://{bucket}/{key}: {source}")]
    Upload {
        bucket: String,
        key: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors_keep_their_query_id() {
        let err = QueryError::StillRunning {
            query_id: "q-1".into(),
            status: "Running".into(),
            attempts: 3,
        };
        assert!(err.is_retryable());
        assert_eq!(err.query_id(), Some("q-1"));

        let err = QueryError::DeadlineExceeded {
            query_id: "q-2".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.query_id(), Some("q-2"));
    }

    #[test]
    fn submission_failures_are_fatal_without_id() {
        let err = QueryError::Submit(BackendError::Request("AccessDenied".into()));
        assert!(!err.is_retryable());
        assert_eq!(err.query_id(), None);
        assert_eq!(err.to_string(), "failed StartQuery: AccessDenied");
    }

    #[test]
    fn unexpected_status_is_fatal() {
        let err = QueryError::UnexpectedStatus {
            query_id: "q-3".into(),
            status: "Failed".into(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.query_id(), Some("q-3"));
        assert!(err.to_string().contains("Failed"));
    }
}
