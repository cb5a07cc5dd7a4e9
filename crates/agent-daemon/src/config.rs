// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a partial JSON file merged over documented
//! defaults, then overridden by environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for env var {var}: {value}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    pub pre_warm: usize,
    pub pre_warm_mix: (u32, u32, u32),
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            pre_warm: 3,
            pre_warm_mix: (3, 2, 1),
            stale_after_secs: 5 * 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub default_job_timeout_secs: u64,
    pub max_job_timeout_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_job_timeout_secs: 120,
            max_job_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub max_size: usize,
    pub flush_interval_ms: u64,
    pub overflow_soft_cap: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_size: 50,
            flush_interval_ms: 2000,
            overflow_soft_cap: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_timeout_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    pub working_dir: PathBuf,
    pub sessions_endpoint: String,
    pub upload_endpoint: String,
    pub network_logs_endpoint: String,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/var/lib/agent/jobs"),
            sessions_endpoint: "http://localhost:9000/internal/sessions".into(),
            upload_endpoint: "http://localhost:9000/internal/artifacts".into(),
            network_logs_endpoint: "http://localhost:9000/internal/network-logs".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub quality: u8,
    pub framerate: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { quality: 80, framerate: 24 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    pub budget_secs: u64,
    pub per_handler_deadline_secs: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            budget_secs: 30,
            per_handler_deadline_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Compact
    }
}

/// Which [`agent_pool::WorkerBackend`] impl the pool is wired to. Picked
/// once at startup — switching backends is a restart, not a runtime
/// toggle (§A.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerBackendKind {
    Container,
    InProcess,
}

impl Default for WorkerBackendKind {
    fn default() -> Self {
        WorkerBackendKind::InProcess
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: WorkerBackendKind,
    /// RPC port the container backend expects each worker's browser to
    /// expose its CDP/WebDriver endpoint on.
    pub container_rpc_port: u16,
    /// Whether the in-process backend launches headless browsers.
    pub headless: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: WorkerBackendKind::InProcess,
            container_rpc_port: 9222,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    pub directory: PathBuf,
    pub file_name: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            directory: PathBuf::from("/var/log/agent"),
            file_name: "agent.log".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: SocketAddr,
    pub metrics_listen: SocketAddr,
    pub prefix: String,
    pub control_plane_base_url: String,
    pub cors_allowed_origins: Vec<String>,
    pub pool: PoolSettings,
    pub queue_size: usize,
    pub parallelism: usize,
    pub timeouts: TimeoutSettings,
    pub batch: BatchSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub artifacts: ArtifactSettings,
    pub recording: RecordingSettings,
    pub shutdown: ShutdownSettings,
    pub log: LogSettings,
    pub snapshot_path: PathBuf,
    pub backend: BackendSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8088".parse().unwrap_or_else(|_| {
                SocketAddr::from(([0, 0, 0, 0], 8088))
            }),
            metrics_listen: SocketAddr::from(([0, 0, 0, 0], 9090)),
            prefix: "/v1".into(),
            control_plane_base_url: "http://localhost:9000".into(),
            cors_allowed_origins: Vec::new(),
            pool: PoolSettings::default(),
            queue_size: 256,
            parallelism: 4,
            timeouts: TimeoutSettings::default(),
            batch: BatchSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            artifacts: ArtifactSettings::default(),
            recording: RecordingSettings::default(),
            shutdown: ShutdownSettings::default(),
            log: LogSettings::default(),
            snapshot_path: PathBuf::from("/var/lib/agent/snapshot.json"),
            backend: BackendSettings::default(),
        }
    }
}

impl Config {
    /// Load from `path`, merging a (possibly partial) JSON document over
    /// the defaults, then applying environment-variable overrides. A
    /// missing file is not an error — the defaults stand alone.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_var("AGENT_LISTEN") {
            self.listen = value
                .parse()
                .map_err(|_| ConfigError::Env { var: "AGENT_LISTEN", value: value.clone() })?;
        }
        if let Some(value) = env_var("AGENT_METRICS_LISTEN") {
            self.metrics_listen = value
                .parse()
                .map_err(|_| ConfigError::Env { var: "AGENT_METRICS_LISTEN", value: value.clone() })?;
        }
        if let Some(value) = env_var("AGENT_CONTROL_PLANE_URL") {
            self.control_plane_base_url = value;
        }
        if let Some(value) = env_var("AGENT_PARALLELISM") {
            self.parallelism = parse_env("AGENT_PARALLELISM", &value)?;
        }
        if let Some(value) = env_var("AGENT_QUEUE_SIZE") {
            self.queue_size = parse_env("AGENT_QUEUE_SIZE", &value)?;
        }
        if let Some(value) = env_var("AGENT_POOL_MAX_SIZE") {
            self.pool.max_size = parse_env("AGENT_POOL_MAX_SIZE", &value)?;
        }
        Ok(())
    }

    pub fn default_job_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.default_job_timeout_secs)
    }

    pub fn max_job_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.max_job_timeout_secs)
    }

    pub fn shutdown_budget(&self) -> Duration {
        Duration::from_secs(self.shutdown.budget_secs)
    }

    pub fn per_handler_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown.per_handler_deadline_secs)
    }
}

fn env_var(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Env { var, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.queue_size, Config::default().queue_size);
    }

    #[test]
    fn partial_file_falls_back_to_defaults_for_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"queue_size": 16}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.queue_size, 16);
        assert_eq!(config.parallelism, Config::default().parallelism);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
