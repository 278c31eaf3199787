//! Configuration for the repaint bot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use repaint_core::{DEFAULT_BASE_URL, DispatcherConfig, HeaderNames, HttpApiConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Remote API settings.
    pub api: ApiConfig,
    /// What to draw and where.
    pub target: TargetConfig,
    /// Credentials, one worker each.
    pub workers: WorkersConfig,
    /// Pacing of the dispatch loop.
    pub schedule: ScheduleConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Service root URL.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Rate-limit header names.
    pub headers: HeaderConfig,
}

/// Response headers that carry rate-limit signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub remaining: String,
    pub reset: String,
    pub cooldown: String,
    pub upstream: String,
}

/// Target image placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Path to an RGBA image.
    pub image: PathBuf,
    /// Canvas column of the image's left edge.
    pub offset_x: u32,
    /// Canvas row of the image's top edge.
    pub offset_y: u32,
}

/// Worker credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// API tokens.
    pub tokens: Vec<String>,
}

/// Dispatch loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Sleep after a pass that found nothing to fix, in seconds.
    pub idle_interval_secs: u64,
    /// Sleep after a failed canvas read, in seconds.
    pub fetch_retry_secs: u64,
    /// Minimum pause between two writes of one worker, in milliseconds.
    pub jitter_min_ms: u64,
    /// Maximum pause between two writes of one worker, in milliseconds.
    pub jitter_max_ms: u64,
    /// Extra wait on top of the shortest cooldown, in milliseconds.
    pub cooldown_margin_ms: u64,
    /// Wait assumed for a bare 429, in seconds.
    pub throttle_fallback_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

/// A config file that exists but is unusable.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout_ms: 10_000,
            headers: HeaderConfig::default(),
        }
    }
}

impl Default for HeaderConfig {
    fn default() -> Self {
        let names = HeaderNames::default();
        Self {
            remaining: names.remaining,
            reset: names.reset,
            cooldown: names.cooldown,
            upstream: names.upstream,
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            image: PathBuf::from("target.png"),
            offset_x: 0,
            offset_y: 0,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 60,
            fetch_retry_secs: 5,
            jitter_min_ms: 250,
            jitter_max_ms: 1000,
            cooldown_margin_ms: 500,
            throttle_fallback_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl BotConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults. A file that exists but cannot be
    /// read or parsed is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigFileError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&contents).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply command-line overrides. Extra tokens are appended.
    pub fn apply_overrides(&mut self, tokens: &[String], image: Option<&Path>) {
        self.workers
            .tokens
            .extend(tokens.iter().filter(|t| !t.trim().is_empty()).cloned());
        if let Some(image) = image {
            self.target.image = image.to_path_buf();
        }
    }

    /// Settings for the HTTP client.
    pub fn to_api_config(&self) -> HttpApiConfig {
        HttpApiConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_millis(self.api.timeout_ms.max(1)),
            headers: HeaderNames {
                remaining: self.api.headers.remaining.clone(),
                reset: self.api.headers.reset.clone(),
                cooldown: self.api.headers.cooldown.clone(),
                upstream: self.api.headers.upstream.clone(),
            },
            throttle_fallback: Duration::from_secs(self.schedule.throttle_fallback_secs),
        }
    }

    /// Settings for the dispatch loop.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        let s = &self.schedule;
        DispatcherConfig {
            idle_interval: Duration::from_secs(s.idle_interval_secs),
            fetch_retry: Duration::from_secs(s.fetch_retry_secs),
            jitter_min: Duration::from_millis(s.jitter_min_ms),
            jitter_max: Duration::from_millis(s.jitter_max_ms),
            cooldown_margin: Duration::from_millis(s.cooldown_margin_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
