use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::report::TABLE_ROW_CAP;
use crate::status::DEFAULT_MAX_RECORDS;

/// Optional JSON setup file; environment variables always win over it.
#[derive(Debug, Clone, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    redis_url: Option<String>,
    #[serde(default)]
    grpc_port: Option<u16>,
    #[serde(default)]
    request_timeout_ms: Option<u64>,
    #[serde(default)]
    table_row_cap: Option<usize>,
    #[serde(default)]
    status_max_records: Option<usize>,
}

fn setup_config_path() -> Option<PathBuf> {
    env::var("REPORTER_SETUP_CONFIG_PATH")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

fn load_setup_config_overrides() -> Option<SetupConfigOverrides> {
    let path = setup_config_path()?;
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub grpc_port: u16,
    /// Redis TimeSeries URL; credentials go in the URL
    /// (`redis://:password@host:port/db`).
    pub redis_url: String,
    pub request_timeout_ms: u64,
    pub table_row_cap: usize,
    /// Status record retention cap; oldest records are evicted past this.
    pub status_max_records: usize,
    pub otlp_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overrides = load_setup_config_overrides();
        let env_allows = |key: &str| {
            env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .is_none()
        };

        let mut grpc_port = env::var("REPORTER_GRPC_PORT")
            .or_else(|_| env::var("GRPC_PORT"))
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(50051);
        let mut redis_url = env::var("REPORTER_REDIS_URL")
            .or_else(|_| env::var("REDIS_TIMESERIES_URL"))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "redis://127.0.0.1:6380".to_string());
        let mut request_timeout_ms = env::var("REPORTER_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30_000);
        let mut table_row_cap = env::var("REPORTER_TABLE_ROW_CAP")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(TABLE_ROW_CAP);
        let mut status_max_records = env::var("REPORTER_STATUS_MAX_RECORDS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_RECORDS);
        let otlp_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        if let Some(overrides) = overrides {
            if env_allows("REPORTER_REDIS_URL") && env_allows("REDIS_TIMESERIES_URL") {
                if let Some(url) = overrides
                    .redis_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                {
                    redis_url = url.to_string();
                }
            }
            if env_allows("REPORTER_GRPC_PORT") && env_allows("GRPC_PORT") {
                if let Some(port) = overrides.grpc_port.filter(|p| *p != 0) {
                    grpc_port = port;
                }
            }
            if env_allows("REPORTER_REQUEST_TIMEOUT_MS") {
                if let Some(value) = overrides.request_timeout_ms.filter(|v| *v != 0) {
                    request_timeout_ms = value;
                }
            }
            if env_allows("REPORTER_TABLE_ROW_CAP") {
                if let Some(value) = overrides.table_row_cap.filter(|v| *v != 0) {
                    table_row_cap = value;
                }
            }
            if env_allows("REPORTER_STATUS_MAX_RECORDS") {
                if let Some(value) = overrides.status_max_records.filter(|v| *v != 0) {
                    status_max_records = value;
                }
            }
        }

        Ok(Self {
            grpc_port,
            redis_url,
            request_timeout_ms,
            table_row_cap,
            status_max_records,
            otlp_endpoint,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
