use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use logs_query_exec::config::{load_sdk_config, Config};
use logs_query_exec::log_fetcher::{AwsLogFetcher, FakeLogFetcher, LogFetcher};
use logs_query_exec::storage::{MemoryObjectStore, ObjectStore, S3ObjectStore};
use logs_query_exec::{telemetry, ExecutionCoordinator, RequestEvent};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let use_fake = args.iter().any(|arg| arg == "--fake" || arg == "-f");
    let payload_arg = args
        .iter()
        .find(|arg| !arg.starts_with('-'))
        .map(PathBuf::from);

    let config = Config::load().context("failed to load configuration")?;

    let (fetcher, store): (Arc<dyn LogFetcher>, Arc<dyn ObjectStore>) = if use_fake {
        info!("using built-in fake backend and in-memory store");
        (
            Arc::new(FakeLogFetcher::new()),
            Arc::new(MemoryObjectStore::new()),
        )
    } else {
        let sdk_config = load_sdk_config(&config.aws).await;
        (
            Arc::new(AwsLogFetcher::new(&sdk_config)),
            Arc::new(S3ObjectStore::new(&sdk_config)),
        )
    };

    let Some(payload_path) = payload_arg.or_else(|| config.sample_request_json.clone()) else {
        bail!("no request payload: pass a file path or set sample_request_json");
    };
    info!(path = %payload_path.display(), "loading request payload");
    let raw = fs::read_to_string(&payload_path)
        .with_context(|| format!("failed to read {}", payload_path.display()))?;
    let event: RequestEvent = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", payload_path.display()))?;

    let coordinator = ExecutionCoordinator::new(fetcher, store, &config);
    let response = coordinator.handle_event(&event).await;
    println!("{}", response.to_json());

    if !response.is_success() && !response.enable_retry {
        std::process::exit(1);
    }
    Ok(())
}
