//! TOML configuration for testledger.
//!
//! Layered model: an explicit file named by `TESTLEDGER_CONFIG`, then
//! `./testledger.toml`, then compiled-in defaults. The resolved value is
//! handed to each component; nothing below `main` reads the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::record::DEFAULT_CAPACITY;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TESTLEDGER_CONFIG";

/// Environment variable that can switch recording off (`false`).
pub const ENABLE_ENV: &str = "ENABLE_HISTORIC_REPORTER";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "testledger.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestLedgerConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => write!(f, "defaults"),
        }
    }
}

/// Result of layered loading.
///
/// Loading happens before the log subscriber exists, so problems are
/// collected here and logged by the caller afterwards.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TestLedgerConfig,
    pub source: ConfigSource,
    pub warnings: Vec<String>,
}

impl TestLedgerConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the configuration from explicit inputs.
    ///
    /// 1. `config_env`, the value of `TESTLEDGER_CONFIG`, if set.
    /// 2. `local_path`, if it exists.
    /// 3. Defaults.
    ///
    /// `enable_env` is the value of `ENABLE_HISTORIC_REPORTER`; `false`
    /// (any case) or `0` turns recording off regardless of the file.
    pub fn resolve(
        config_env: Option<&str>,
        enable_env: Option<&str>,
        local_path: &Path,
    ) -> LoadedConfig {
        let mut warnings = Vec::new();
        let mut loaded = None;

        // 1. Environment variable override.
        if let Some(env_path) = config_env.filter(|p| !p.trim().is_empty()) {
            let path = Path::new(env_path);
            match Self::load(path) {
                Ok(cfg) => loaded = Some((cfg, ConfigSource::File(path.to_path_buf()))),
                Err(e) => warnings.push(format!(
                    "{} set but file could not be loaded, trying fallback: {:#}",
                    CONFIG_ENV, e
                )),
            }
        }

        // 2. Working-directory file.
        if loaded.is_none() && local_path.exists() {
            match Self::load(local_path) {
                Ok(cfg) => loaded = Some((cfg, ConfigSource::File(local_path.to_path_buf()))),
                Err(e) => warnings.push(format!(
                    "config file exists but could not be loaded, using defaults: {:#}",
                    e
                )),
            }
        }

        // 3. Defaults.
        let (mut config, source) = loaded.unwrap_or((Self::default(), ConfigSource::Defaults));

        if let Some(flag) = enable_env {
            let flag = flag.trim();
            if flag.eq_ignore_ascii_case("false") || flag == "0" {
                config.recorder.enabled = false;
            }
        }

        LoadedConfig {
            config,
            source,
            warnings,
        }
    }

    /// [`resolve`](Self::resolve) against the process environment and the
    /// working directory.
    pub fn load_or_default() -> LoadedConfig {
        let config_env = std::env::var(CONFIG_ENV).ok();
        let enable_env = std::env::var(ENABLE_ENV).ok();
        Self::resolve(
            config_env.as_deref(),
            enable_env.as_deref(),
            Path::new(LOCAL_CONFIG_FILE),
        )
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Location and retention of the historic store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the collection file and standalone run artifacts.
    pub dir: PathBuf,
    /// File name of the bounded collection inside `dir`.
    pub history_file: String,
    /// Maximum number of runs kept in the collection.
    pub capacity: usize,
    /// How long an append waits for the advisory lock (milliseconds).
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./test-results/historic-reports"),
            history_file: "historic-data.json".to_string(),
            capacity: DEFAULT_CAPACITY,
            lock_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// When false, runs are still parsed but nothing is persisted.
    pub enabled: bool,
    /// Environment tag used when no provider supplies one.
    pub environment: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            environment: "development".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

/// Trailing windows (days) and limits used by the CLI views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub summary_window_days: u32,
    pub flaky_window_days: u32,
    /// Number of entries shown by the flaky view.
    pub flaky_limit: usize,
    pub trend_window_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            summary_window_days: 7,
            flaky_window_days: 14,
            flaky_limit: 10,
            trend_window_days: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
