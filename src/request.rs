use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{RequestError, ValidationError};
use crate::log_fetcher::QueryParams;

/// Inbound invocation payload. Function URLs deliver the API Gateway v2
/// shape, so the field names follow that payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(default)]
    pub body: String,
    #[serde(default, rename = "isBase64Encoded", alias = "is_base64_encoded")]
    pub is_base64_encoded: bool,
}

impl RequestEvent {
    /// Wraps a request as a base64 encoded envelope.
    pub fn encode(request: &QueryRequest) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(request)?;
        Ok(Self {
            body: STANDARD.encode(json),
            is_base64_encoded: true,
        })
    }

    pub fn body(&self) -> Result<String, RequestError> {
        if !self.is_base64_encoded {
            return Ok(self.body.clone());
        }
        let decoded = STANDARD
            .decode(self.body.trim())
            .map_err(RequestError::Body)?;
        Ok(String::from_utf8(decoded)?)
    }

    pub fn parse(&self) -> Result<QueryRequest, RequestError> {
        let body = self.body()?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Caller payload. Either a fresh query or a resumption carrying `query_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_group_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_query_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
}

/// What a validated request asks the executor to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    Fresh(QueryParams),
    Resume(QueryHandle),
}

impl QueryRequest {
    pub fn resume(query_id: impl Into<String>) -> Self {
        Self {
            query_id: Some(query_id.into()),
            ..Self::default()
        }
    }

    fn resumption_id(&self) -> Option<&str> {
        self.query_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns every problem with the request at once. A non-empty
    /// `query_id` skips all other checks.
    pub fn validate(&self) -> Vec<ValidationError> {
        if self.resumption_id().is_some() {
            return Vec::new();
        }

        let mut errors = Vec::new();

        if self.log_group_names.iter().all(|name| name.trim().is_empty()) {
            errors.push(ValidationError::Missing("log_group_names"));
        }

        let has_text = |text: &Option<String>| text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text(&self.query_string) && !has_text(&self.encoded_query_string) {
            errors.push(ValidationError::Missing("query_string"));
        }

        check_bound(&mut errors, "start_time", self.start_time);
        check_bound(&mut errors, "end_time", self.end_time);
        check_bound(&mut errors, "limit", self.limit.map(i64::from));

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= 0 && end >= 0 && start > end {
                errors.push(ValidationError::InvertedRange { start, end });
            }
        }

        errors
    }

    /// Query text with `encoded_query_string` taking precedence.
    pub fn query_text(&self) -> Result<Option<String>, RequestError> {
        if let Some(encoded) = self
            .encoded_query_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            let decoded = STANDARD
                .decode(encoded.trim())
                .map_err(RequestError::QueryText)?;
            return Ok(Some(String::from_utf8(decoded)?));
        }
        Ok(self
            .query_string
            .clone()
            .filter(|s| !s.trim().is_empty()))
    }

    pub fn plan(&self) -> Result<QueryPlan, RequestError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(RequestError::Invalid(errors));
        }
        if let Some(id) = self.resumption_id() {
            return Ok(QueryPlan::Resume(QueryHandle::new(id)));
        }

        let query = self
            .query_text()?
            .ok_or(RequestError::Invalid(vec![ValidationError::Missing(
                "query_string",
            )]))?;

        let mut log_group_names: Vec<String> = Vec::new();
        for name in &self.log_group_names {
            let name = name.trim();
            if !name.is_empty() && !log_group_names.iter().any(|seen| seen == name) {
                log_group_names.push(name.to_string());
            }
        }

        // validate() guarantees these are present
        let (Some(start_epoch), Some(end_epoch), Some(limit)) =
            (self.start_time, self.end_time, self.limit)
        else {
            return Err(RequestError::Invalid(self.validate()));
        };

        Ok(QueryPlan::Fresh(QueryParams {
            log_group_names,
            query,
            start_epoch,
            end_epoch,
            limit,
        }))
    }
}

fn check_bound(errors: &mut Vec<ValidationError>, field: &'static str, value: Option<i64>) {
    match value {
        None => errors.push(ValidationError::Missing(field)),
        Some(value) if value < 0 => errors.push(ValidationError::Negative { field, value }),
        Some(_) => {}
    }
}

/// Opaque identifier assigned by the log backend on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
