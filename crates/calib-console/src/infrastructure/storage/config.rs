//! TOML-based configuration persistence for the operator console.
//!
//! The console reads one file, `calib-console.toml` by default:
//!
//! ```toml
//! [agent]
//! url = "ws://127.0.0.1:24900"
//! open_timeout_secs = 10
//!
//! [operator]
//! name = "admin"
//!
//! [storage]
//! profiles_path = "profiles.toml"
//!
//! [journal]
//! enabled = true
//! dir = "calibration_logs"
//!
//! [logging]
//! level = "info"
//!
//! # Optional: replaces the built-in calibration plan.
//! [[plan]]
//! element_type = "main_plus_button"
//! element_name = "Main + button"
//! instructions = "Click the + button at the bottom centre of the screen."
//! default_position = [0.5, 0.93]
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "some_fn")]`, so an empty or
//! partial file is valid and older files keep working when new fields are
//! added.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use calib_core::{CalibrationPlan, PlanError, PlanStep};

/// Error type for configuration and profile file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The value could not be serialized to TOML.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The `[[plan]]` override is not a valid calibration plan.
    #[error("invalid calibration plan: {0}")]
    Plan(#[from] PlanError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level console configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub agent: AgentEndpoint,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Custom plan steps.  Empty means the built-in reference plan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<PlanStep>,
}

/// Where the streaming agent listens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEndpoint {
    /// Base WebSocket URL; the device path `/ws/<device_id>` is appended.
    #[serde(default = "default_agent_url")]
    pub url: String,
    /// Seconds to wait for the WebSocket handshake before giving up.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperatorConfig {
    /// Recorded as `calibrated_by` on every clicked coordinate.
    #[serde(default = "default_operator")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// TOML file holding device profiles and their coordinates.
    #[serde(default = "default_profiles_path")]
    pub profiles_path: PathBuf,
}

/// Per-session event log and click screenshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_journal_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_agent_url() -> String {
    "ws://127.0.0.1:24900".to_string()
}
fn default_open_timeout_secs() -> u64 {
    10
}
fn default_operator() -> String {
    "admin".to_string()
}
fn default_profiles_path() -> PathBuf {
    PathBuf::from("profiles.toml")
}
fn default_true() -> bool {
    true
}
fn default_journal_dir() -> PathBuf {
    PathBuf::from("calibration_logs")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentEndpoint {
    fn default() -> Self {
        Self {
            url: default_agent_url(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            name: default_operator(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            profiles_path: default_profiles_path(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_journal_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AgentEndpoint {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

impl ConsoleConfig {
    /// The calibration plan to run: the `[[plan]]` override if present,
    /// otherwise [`CalibrationPlan::reference`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Plan`] if the override has duplicate elements or
    /// out-of-range default positions.
    pub fn calibration_plan(&self) -> Result<CalibrationPlan, ConfigError> {
        if self.plan.is_empty() {
            return Ok(CalibrationPlan::reference());
        }
        Ok(CalibrationPlan::new(self.plan.clone())?)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

impl ConsoleConfig {
    /// Loads the configuration from `path`, returning the defaults if the
    /// file does not yet exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not found",
    /// and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Persists the configuration to `path`, creating parent directories as
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system failures or
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        write_toml(path, self)
    }
}

/// Serializes `value` as pretty TOML and writes it to `path`.
pub(crate) fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
