// ConfigurationStore: loads worker settings from a JSON file and the environment.

use crate::constants::{defaults, env};
use crate::error::ConfigError;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use worker_sdk::StringUtil;

// ---------------------------------------------------------------------------
// WorkerSettings
// ---------------------------------------------------------------------------

/// Worker configuration. Every field has a default so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSettings {
    /// Base URL of the build script rendering service.
    pub build_api_url: String,

    /// Number of processors pulling jobs concurrently.
    pub pool_size: usize,

    /// Upper bound on a single job attempt, in seconds.
    pub hard_timeout_secs: u64,

    /// Per-request timeout for remote HTTP services, in seconds.
    pub http_timeout_secs: u64,

    /// Disable TLS certificate verification for remote services.
    pub skip_tls_verify: bool,

    /// Name attached to every log line emitted by this worker.
    pub worker_name: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            build_api_url: String::new(),
            pool_size: defaults::POOL_SIZE,
            hard_timeout_secs: defaults::HARD_TIMEOUT_SECS,
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
            skip_tls_verify: false,
            worker_name: defaults::WORKER_NAME.to_string(),
        }
    }
}

impl WorkerSettings {
    /// The hard timeout as a `Duration`.
    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }

    /// The HTTP request timeout as a `Duration`.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, which maps an env var name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(env::BUILD_API_URL) {
            self.build_api_url = url;
        }
        if let Some(value) = lookup(env::POOL_SIZE) {
            self.pool_size = parse_number(env::POOL_SIZE, &value)?;
        }
        if let Some(value) = lookup(env::HARD_TIMEOUT) {
            self.hard_timeout_secs = parse_number(env::HARD_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(env::HTTP_TIMEOUT) {
            self.http_timeout_secs = parse_number(env::HTTP_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(env::SKIP_TLS_VERIFY) {
            self.skip_tls_verify = StringUtil::convert_to_bool(&value).ok_or(
                ConfigError::InvalidValue {
                    key: env::SKIP_TLS_VERIFY,
                    value,
                },
            )?;
        }
        if let Some(name) = lookup(env::WORKER_NAME) {
            if !name.is_empty() {
                self.worker_name = name;
            }
        }
        Ok(())
    }

    /// Check that the settings can drive a worker.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_api_url.is_empty() {
            return Err(ConfigError::Missing(env::BUILD_API_URL));
        }
        url::Url::parse(&self.build_api_url).map_err(|source| ConfigError::InvalidUrl {
            key: env::BUILD_API_URL,
            value: self.build_api_url.clone(),
            source,
        })?;
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: env::POOL_SIZE,
                value: "0".to_string(),
            });
        }
        if self.hard_timeout_secs == 0
            || self.hard_timeout_secs > defaults::MAX_HARD_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                key: env::HARD_TIMEOUT,
                value: self.hard_timeout_secs.to_string(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: env::HTTP_TIMEOUT,
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// ConfigurationStore
// ---------------------------------------------------------------------------

/// Reads and writes `WorkerSettings` as JSON at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigurationStore {
    path: PathBuf,
}

impl ConfigurationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the settings file exists.
    pub fn is_configured(&self) -> bool {
        self.path.exists()
    }

    /// Load settings from disk.
    pub fn load(&self) -> Result<WorkerSettings, ConfigError> {
        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Save settings to disk as pretty-printed JSON.
    pub fn save(&self, settings: &WorkerSettings) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(settings).map_err(ConfigError::Serialize)?;
        fs::write(&self.path, json).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Resolve the effective settings: file (when present), then environment,
    /// then validation.
    pub fn resolve(&self) -> Result<WorkerSettings, ConfigError> {
        let mut settings = if self.is_configured() {
            self.load()?
        } else {
            tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
            WorkerSettings::default()
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }
}
