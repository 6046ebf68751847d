//! Builds a request envelope for `logs-query-exec` from command-line options.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use clap::Parser;
use logs_query_exec::{QueryRequest, RequestEvent};

/// Build a base64 request envelope for a fresh or resumed query.
///
/// Times are unix seconds or `YYYY-MM-DD[ HH:MM[:SS]]` in local time.
#[derive(Debug, Parser)]
#[command(name = "lqe-request", version, about, long_about = None)]
struct Cli {
    /// Log group names, comma separated or repeated.
    #[arg(
        short = 'g',
        long,
        value_delimiter = ',',
        required_unless_present = "resume",
        conflicts_with = "resume"
    )]
    log_group_names: Vec<String>,

    /// Query window start.
    #[arg(
        short,
        long,
        value_parser = parse_time,
        required_unless_present = "resume",
        conflicts_with = "resume"
    )]
    start: Option<i64>,

    /// Query window end.
    #[arg(
        short,
        long,
        value_parser = parse_time,
        required_unless_present = "resume",
        conflicts_with = "resume"
    )]
    end: Option<i64>,

    /// Result row limit.
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(i32).range(0..),
        required_unless_present = "resume",
        conflicts_with = "resume"
    )]
    limit: Option<i32>,

    /// Logs Insights query file.
    #[arg(
        short = 'q',
        long,
        required_unless_present = "resume",
        conflicts_with = "resume"
    )]
    query_file: Option<PathBuf>,

    /// Output file. Writes to stdout when omitted.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Resume an existing query by id.
    #[arg(long)]
    resume: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let request = build_request(&cli)?;
    let event = RequestEvent::encode(&request).context("failed to encode request")?;
    let json = serde_json::to_string(&event)?;

    match cli.out.as_deref() {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => writeln!(io::stdout(), "{json}")?,
    }
    Ok(())
}

fn build_request(cli: &Cli) -> Result<QueryRequest> {
    if let Some(query_id) = &cli.resume {
        return Ok(QueryRequest::resume(query_id.clone()));
    }
    let path = cli
        .query_file
        .as_deref()
        .ok_or_else(|| anyhow!("--query-file is required"))?;
    let query = fs::read(path)
        .with_context(|| format!("failed to read query file {}", path.display()))?;

    Ok(QueryRequest {
        log_group_names: cli
            .log_group_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        encoded_query_string: Some(STANDARD.encode(query)),
        start_time: cli.start,
        end_time: cli.end,
        limit: cli.limit,
        ..QueryRequest::default()
    })
}

/// Unix seconds, or a local date/time.
fn parse_time(input: &str) -> Result<i64, String> {
    let trimmed = input.trim();
    if let Ok(epoch) = trimmed.parse::<i64>() {
        return Ok(epoch);
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN))
        })
        .map_err(|_| "use unix seconds or YYYY-MM-DD[ HH:MM[:SS]]".to_string())?;

    match Local.from_local_datetime(&naive) {
        LocalResult::Single(local) => Ok(local.timestamp()),
        LocalResult::Ambiguous(_, _) => Err("ambiguous local time".into()),
        LocalResult::None => Err("invalid local time".into()),
    }
}
