use crate::LoadBalancingStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for TaskMesh
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TaskMeshConfig {
    /// Scheduler loop, worker pool and placement settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Settings for the built-in simulated executor
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Upper bound on concurrently executing tasks, across all agents
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Scheduler loop tick (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Placement strategy
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,

    /// Agents whose last heartbeat is older than this are not placed onto (seconds)
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,

    /// Hold tasks until all of their dependencies have completed
    #[serde(default)]
    pub enforce_dependencies: bool,

    /// Tasks dispatched per role queue on each tick
    #[serde(default = "default_max_dispatch_per_role")]
    pub max_dispatch_per_role: usize,

    /// Terminal tasks kept for status/result lookups
    #[serde(default = "default_finished_history_limit")]
    pub finished_history_limit: usize,

    /// Fixed seed for the strategies' random source (tests, reproducible runs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Saturates at `chrono::Duration::MAX`; validation rejects timeouts
    /// that do not fit.
    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        timeout_from_secs(self.heartbeat_timeout_secs).unwrap_or(chrono::Duration::MAX)
    }
}

/// Upper bound on the worker pool. Keeps `max_workers` well inside what a
/// tokio semaphore can hold.
pub const MAX_WORKERS: usize = 65_536;

fn timeout_from_secs(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            strategy: LoadBalancingStrategy::default(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            enforce_dependencies: false,
            max_dispatch_per_role: default_max_dispatch_per_role(),
            finished_history_limit: default_finished_history_limit(),
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Longest the simulated executor sleeps for a single task (seconds)
    #[serde(default = "default_simulated_duration_cap_secs")]
    pub simulated_duration_cap_secs: f64,

    /// Lower bound of the duration jitter factor
    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,

    /// Upper bound of the duration jitter factor
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            simulated_duration_cap_secs: default_simulated_duration_cap_secs(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_workers() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_heartbeat_timeout_secs() -> u64 {
    60
}
fn default_max_dispatch_per_role() -> usize {
    1
}
fn default_finished_history_limit() -> usize {
    10_000
}
fn default_simulated_duration_cap_secs() -> f64 {
    5.0
}
fn default_jitter_min() -> f64 {
    0.8
}
fn default_jitter_max() -> f64 {
    1.2
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager
pub struct ConfigManager {
    config: TaskMeshConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.taskmesh.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;

        match &config_path {
            Some(path) => info!(path = %path.display(), "configuration loaded"),
            None => info!("no config file found, using defaults"),
        }
        info!(
            strategy = %config.scheduler.strategy,
            max_workers = config.scheduler.max_workers,
            poll_interval_ms = config.scheduler.poll_interval_ms,
            "scheduler configuration"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load a specific file, still honouring environment overrides.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already-built configuration after validating it.
    pub fn from_config(config: TaskMeshConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".taskmesh.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .taskmesh.env: {}", e);
                }
            }
        }
    }

    /// Search order:
    /// 1. ./.taskmesh.toml
    /// 2. ~/.taskmesh/config.toml
    /// 3. defaults
    fn load_config_file() -> Result<(TaskMeshConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".taskmesh.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".taskmesh").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((TaskMeshConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<TaskMeshConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Environment overrides. Unparseable values are ignored with a warning.
    fn apply_env_overrides<F>(mut config: TaskMeshConfig, lookup: F) -> TaskMeshConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> Option<T> {
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring unparseable environment override");
                    None
                }
            }
        }

        let sched = &mut config.scheduler;
        if let Some(v) = lookup("TASKMESH_MAX_WORKERS").and_then(|v| parsed("TASKMESH_MAX_WORKERS", v)) {
            sched.max_workers = v;
        }
        if let Some(v) =
            lookup("TASKMESH_POLL_INTERVAL_MS").and_then(|v| parsed("TASKMESH_POLL_INTERVAL_MS", v))
        {
            sched.poll_interval_ms = v;
        }
        if let Some(v) = lookup("TASKMESH_STRATEGY").and_then(|v| parsed("TASKMESH_STRATEGY", v)) {
            sched.strategy = v;
        }
        if let Some(v) = lookup("TASKMESH_HEARTBEAT_TIMEOUT_SECS")
            .and_then(|v| parsed("TASKMESH_HEARTBEAT_TIMEOUT_SECS", v))
        {
            sched.heartbeat_timeout_secs = v;
        }
        if let Some(v) = lookup("TASKMESH_ENFORCE_DEPENDENCIES") {
            sched.enforce_dependencies = v.to_lowercase() == "true" || v == "1";
        }
        if let Some(v) = lookup("TASKMESH_MAX_DISPATCH_PER_ROLE")
            .and_then(|v| parsed("TASKMESH_MAX_DISPATCH_PER_ROLE", v))
        {
            sched.max_dispatch_per_role = v;
        }
        if let Some(v) = lookup("TASKMESH_RNG_SEED").and_then(|v| parsed("TASKMESH_RNG_SEED", v)) {
            sched.rng_seed = Some(v);
        }
        if let Some(v) = lookup("TASKMESH_SIMULATED_DURATION_CAP_SECS")
            .and_then(|v| parsed("TASKMESH_SIMULATED_DURATION_CAP_SECS", v))
        {
            config.execution.simulated_duration_cap_secs = v;
        }

        // Logging
        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("TASKMESH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    fn validate_config(config: &TaskMeshConfig) -> Result<(), ConfigError> {
        let sched = &config.scheduler;
        if sched.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_workers must be at least 1".into(),
            ));
        }
        if sched.max_workers > MAX_WORKERS {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.max_workers must not exceed {}, got {}",
                MAX_WORKERS, sched.max_workers
            )));
        }
        if sched.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.poll_interval_ms must be positive".into(),
            ));
        }
        if sched.heartbeat_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.heartbeat_timeout_secs must be positive".into(),
            ));
        }
        if timeout_from_secs(sched.heartbeat_timeout_secs).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "scheduler.heartbeat_timeout_secs is out of range: {}",
                sched.heartbeat_timeout_secs
            )));
        }
        if sched.max_dispatch_per_role == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_dispatch_per_role must be at least 1".into(),
            ));
        }

        let exec = &config.execution;
        if exec.simulated_duration_cap_secs < 0.0
            || exec.jitter_min < 0.0
            || exec.jitter_min > exec.jitter_max
        {
            return Err(ConfigError::ValidationError(format!(
                "invalid execution settings: cap={} jitter=[{}, {}]",
                exec.simulated_duration_cap_secs, exec.jitter_min, exec.jitter_max
            )));
        }

        // RUST_LOG may carry a full directive ("taskmesh=debug,info"); only
        // plain levels are checked.
        let level = config.logging.level.as_str();
        if !level.contains('=') && !level.contains(',') {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        other
                    )))
                }
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &TaskMeshConfig {
        &self.config
    }

    pub fn into_config(self) -> TaskMeshConfig {
        self.config
    }

    /// Path of the loaded config file, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write the default configuration as TOML
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = TaskMeshConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            }
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = TaskMeshConfig::default();
        assert_eq!(config.scheduler.max_workers, 10);
        assert_eq!(config.scheduler.poll_interval_ms, 100);
        assert_eq!(config.scheduler.heartbeat_timeout_secs, 60);
        assert_eq!(config.scheduler.strategy, LoadBalancingStrategy::Adaptive);
        assert!(!config.scheduler.enforce_dependencies);
        assert!(ConfigManager::validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = TaskMeshConfig::default();

        let mut bad = config.clone();
        bad.scheduler.max_workers = 0;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.scheduler.max_workers = usize::MAX;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut edge = config.clone();
        edge.scheduler.max_workers = MAX_WORKERS;
        assert!(ConfigManager::validate_config(&edge).is_ok());

        let mut bad = config.clone();
        bad.scheduler.heartbeat_timeout_secs = 10_000_000_000_000_000;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.scheduler.heartbeat_timeout_secs = u64::MAX;
        assert!(ConfigManager::validate_config(&bad).is_err());
        assert_eq!(bad.scheduler.heartbeat_timeout(), chrono::Duration::MAX);

        let mut bad = config.clone();
        bad.execution.jitter_min = 1.5;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.logging.format = "xml".into();
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut directive = config;
        directive.logging.level = "taskmesh_scheduler=debug,info".into();
        assert!(ConfigManager::validate_config(&directive).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigManager::apply_env_overrides(
            TaskMeshConfig::default(),
            env(&[
                ("TASKMESH_MAX_WORKERS", "4"),
                ("TASKMESH_STRATEGY", "round-robin"),
                ("TASKMESH_ENFORCE_DEPENDENCIES", "1"),
                ("TASKMESH_POLL_INTERVAL_MS", "not-a-number"),
                ("RUST_LOG", "debug"),
            ]),
        );
        assert_eq!(config.scheduler.max_workers, 4);
        assert_eq!(config.scheduler.strategy, LoadBalancingStrategy::RoundRobin);
        assert!(config.scheduler.enforce_dependencies);
        assert_eq!(config.scheduler.poll_interval_ms, 100);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TaskMeshConfig = toml::from_str(
            r#"
            [scheduler]
            strategy = "least_connections"
            max_workers = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.strategy, LoadBalancingStrategy::LeastConnections);
        assert_eq!(config.scheduler.max_workers, 3);
        assert_eq!(config.scheduler.poll_interval_ms, 100);
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
