use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sketchflow_core::resources::ResourceThresholds;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development next to a
/// ComfyUI instance on the same host.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for background tasks to stop on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Base URL of the ComfyUI HTTP API.
    pub comfyui_url: String,
    pub sessions: SessionConfig,
    pub storage: StorageConfig,
    pub guard: GuardConfig,
}

/// Session lifecycle, job polling and channel liveness settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Admission limit for the session registry.
    pub max_active_sessions: usize,
    /// Idle time after which the sweeper retires a session.
    pub session_timeout: Duration,
    /// Period of the expiry sweeper.
    pub cleanup_interval: Duration,
    /// Period of each channel's liveness check.
    pub heartbeat_check_interval: Duration,
    /// Silence after which a channel is force-closed.
    pub heartbeat_timeout: Duration,
    /// Delay between engine status polls.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: 100,
            session_timeout: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(600),
            heartbeat_check_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// On-disk locations and upload limits.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub result_dir: PathBuf,
    pub workflow_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            result_dir: PathBuf::from("results"),
            workflow_dir: PathBuf::from("workflow"),
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Resource guard sampling settings.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub check_interval: Duration,
    pub thresholds: ResourceThresholds,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            thresholds: ResourceThresholds::default(),
        }
    }
}

/// A configuration variable was set to something unparseable.
#[derive(Debug, thiserror::Error)]
#[error("{key} has invalid value {value:?}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `HOST`                     | `0.0.0.0`                  |
    /// | `PORT`                     | `8000`                     |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                       |
    /// | `COMFYUI_SERVER`           | `http://127.0.0.1:8188`    |
    /// | `MAX_ACTIVE_SESSIONS`      | `100`                      |
    /// | `SESSION_TIMEOUT`          | `3600` (seconds)           |
    /// | `CLEANUP_INTERVAL`         | `600` (seconds)            |
    /// | `HEARTBEAT_CHECK_SECS`     | `10`                       |
    /// | `HEARTBEAT_TIMEOUT_SECS`   | `30`                       |
    /// | `POLL_INTERVAL_MS`         | `500`                      |
    /// | `UPLOAD_DIR`               | `uploads`                  |
    /// | `RESULT_DIR`               | `results`                  |
    /// | `WORKFLOW_DIR`             | `workflow`                 |
    /// | `MAX_UPLOAD_BYTES`         | `5242880`                  |
    /// | `RESOURCE_CHECK_INTERVAL`  | `300` (seconds)            |
    /// | `CPU_THRESHOLD_PERCENT`    | `80`                       |
    /// | `MEMORY_THRESHOLD_PERCENT` | `80`                       |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = env_or("PORT", 8000u16)?;

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let sessions = SessionConfig {
            max_active_sessions: env_or("MAX_ACTIVE_SESSIONS", 100usize)?,
            session_timeout: Duration::from_secs(env_or("SESSION_TIMEOUT", 3600)?),
            cleanup_interval: Duration::from_secs(period_or("CLEANUP_INTERVAL", 600)?),
            heartbeat_check_interval: Duration::from_secs(period_or("HEARTBEAT_CHECK_SECS", 10)?),
            heartbeat_timeout: Duration::from_secs(env_or("HEARTBEAT_TIMEOUT_SECS", 30)?),
            poll_interval: Duration::from_millis(period_or("POLL_INTERVAL_MS", 500)?),
        };

        let defaults = StorageConfig::default();
        let storage = StorageConfig {
            upload_dir: env_or("UPLOAD_DIR", defaults.upload_dir)?,
            result_dir: env_or("RESULT_DIR", defaults.result_dir)?,
            workflow_dir: env_or("WORKFLOW_DIR", defaults.workflow_dir)?,
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        };

        let guard = GuardConfig {
            check_interval: Duration::from_secs(period_or("RESOURCE_CHECK_INTERVAL", 300)?),
            thresholds: ResourceThresholds {
                cpu_percent: env_or("CPU_THRESHOLD_PERCENT", 80.0f32)?,
                memory_percent: env_or("MEMORY_THRESHOLD_PERCENT", 80.0f32)?,
            },
        };

        if sessions.max_active_sessions == 0 {
            return Err(ConfigError {
                key: "MAX_ACTIVE_SESSIONS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30)?,
            comfyui_url: std::env::var("COMFYUI_SERVER")
                .unwrap_or_else(|_| "http://127.0.0.1:8188".into()),
            sessions,
            storage,
            guard,
        })
    }
}

/// Read `key` and parse it, falling back to `default` when unset.
fn env_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            reason: e.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

/// Like [`env_or`] for timer periods, which must be non-zero.
fn period_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = env_or(key, default)?;
    if value == 0 {
        return Err(ConfigError {
            key,
            value: "0".into(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
