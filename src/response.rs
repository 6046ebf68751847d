use serde::{Deserialize, Serialize};

/// Payload returned when the response itself cannot be serialized.
pub const FALLBACK_FAILED_JSON: &str = r#"{"status":"failed"}"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Running,
    #[default]
    Failed,
}

/// What the caller gets back. `enable_retry` alone tells "invoke again with
/// `query_id`" apart from a permanent failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub enable_retry: bool,
    #[serde(default)]
    pub query_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default, rename = "error")]
    pub error_message: String,
}

impl ExecutionResponse {
    pub fn success(
        query_id: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            query_id: query_id.into(),
            file_name: file_name.into(),
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error_message: error.into(),
            ..Self::default()
        }
    }

    /// The query is still going; the caller should resubmit `query_id`.
    pub fn retry_later(query_id: impl Into<String>) -> Self {
        Self {
            enable_retry: true,
            query_id: query_id.into(),
            ..Self::default()
        }
    }

    pub fn with_query_id(mut self, query_id: Option<&str>) -> Self {
        if let Some(query_id) = query_id {
            self.query_id = query_id.to_string();
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Serializes the response, falling back to a fixed failed payload.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| FALLBACK_FAILED_JSON.to_string())
    }
}
