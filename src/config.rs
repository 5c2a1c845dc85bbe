use crate::backend::BackendKind;
use crate::error::{EtlError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration for the warehouse ETL pipeline.
///
/// Everything a run depends on is explicit here; there is no ambient
/// default-argument state shared between runs.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    pub quality: QualityConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Name under which runs are recorded and alerts are sent.
    pub name: String,
    /// Which warehouse executes every stage of a run. One of: postgres, oracle.
    pub backend: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Root directory for the local run log database.
    #[serde(default = "default_data_root")]
    pub data_root: String,
}

/// Retry behaviour applied to the connectivity probe and to stage commands.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_backoff_seconds")]
    pub backoff_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Hour of day (UTC) for the daily trigger.
    #[serde(default = "default_schedule_hour")]
    pub hour: u32,
}

/// External data-quality check invoked after the gold layer.
#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint for failure alerts. DWH_WEBHOOK_URL overrides.
    pub webhook_url: Option<String>,
    #[serde(default = "default_true")]
    pub on_failure: bool,
    #[serde(default)]
    pub on_retry: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            on_failure: true,
            on_retry: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PostgresConfig {
    /// Connection URL for the warehouse. DWH_POSTGRES_URL overrides.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_conn_id")]
    pub conn_id: String,
}

fn default_owner() -> String {
    "data-platform".to_string()
}

fn default_data_root() -> String {
    "data".to_string()
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_retry_backoff_seconds() -> u64 {
    300
}

fn default_schedule_hour() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_oracle_conn_id() -> String {
    "oracle_dwh".to_string()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            backoff_seconds: default_retry_backoff_seconds(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: default_schedule_hour(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            conn_id: default_oracle_conn_id(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects unsupported values before any run is constructed.
    fn validate(&self) -> Result<()> {
        BackendKind::from_str(&self.pipeline.backend)?;
        if self.schedule.hour > 23 {
            return Err(EtlError::Config(format!(
                "schedule.hour must be 0-23, got {}",
                self.schedule.hour
            )));
        }
        if self.quality.command.trim().is_empty() {
            return Err(EtlError::Config(
                "quality.command must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The validated backend selection, fixed for the lifetime of every run.
    pub fn backend_kind(&self) -> BackendKind {
        // validate() already accepted the value at load time
        BackendKind::from_str(&self.pipeline.backend).unwrap_or(BackendKind::Postgres)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry.backoff_seconds)
    }
}
