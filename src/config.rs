use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_types::region::Region;
use aws_types::SdkConfig;
use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_PATH_ENV: &str = "LQE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Deployment configuration, loaded once at startup and passed to each
/// component explicitly.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub temporary_directory: Option<PathBuf>,
    #[serde(default = "default_delete_processed_file")]
    pub delete_processed_file: bool,
    #[serde(default)]
    pub aws: AwsSettings,
    #[serde(default)]
    pub invocation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub sample_request_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts", alias = "max_count")]
    pub max_attempts: u32,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
    /// Fixed jitter seed for reproducible runs. It is mixed with each
    /// `query_id`, so concurrent queries still draw different delays.
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AwsSettings {
    #[serde(default)]
    pub s3_bucket: String,
    #[serde(default)]
    pub s3_object_key_prefix: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
}

fn default_delete_processed_file() -> bool {
    true
}
fn default_min_delay_ms() -> u64 {
    300
}
fn default_max_delay_ms() -> u64 {
    15_000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_max_jitter_ms() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            max_jitter_ms: default_max_jitter_ms(),
            jitter_seed: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry: RetrySettings::default(),
            temporary_directory: None,
            delete_processed_file: default_delete_processed_file(),
            aws: AwsSettings::default(),
            invocation_timeout_secs: None,
            sample_request_json: None,
        }
    }
}

impl Config {
    /// Reads the file named by `LQE_CONFIG`, or `config.yaml`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Config =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bucket) = env::var("LQE_S3_BUCKET") {
            if !bucket.trim().is_empty() {
                self.aws.s3_bucket = bucket.trim().to_string();
            }
        }
        if let Ok(prefix) = env::var("LQE_S3_OBJECT_KEY_PREFIX") {
            self.aws.s3_object_key_prefix = prefix.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aws.s3_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("aws.s3_bucket is required".into()));
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.min_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.min_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.temporary_directory
            .clone()
            .unwrap_or_else(env::temp_dir)
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_secs.map(Duration::from_secs)
    }
}

/// Shared SDK configuration for the CloudWatch Logs and S3 clients.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = settings.profile.as_deref() {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = settings.region.clone() {
        loader = loader.region(Region::new(region));
    }
    loader.load().await
}
