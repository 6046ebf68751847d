//! Runs a CloudWatch Logs Insights query to completion across one or more
//! invocations and exports the rows to S3.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod exporter;
pub mod log_fetcher;
pub mod request;
pub mod response;
pub mod retry;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use coordinator::ExecutionCoordinator;
pub use request::{QueryRequest, RequestEvent};
pub use response::{ExecutionResponse, ResponseStatus};
