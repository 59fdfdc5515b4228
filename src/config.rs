//! Synchronizer configuration loaded from `config.toml`.
//!
//! The file is optional: a missing or empty file yields
//! [`SyncConfig::default()`]. Every key may be omitted; unknown keys are
//! logged and ignored.
//!
//! ```toml
//! auto_update = true
//! fallback_error_threshold = 5
//! check_interval_secs = 3600
//!
//! [client]
//! addon_name = "listsync"
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::download::{CHECK_INTERVAL, CONNECT_TIMEOUT_SECS, INITIAL_DELAY, READ_TIMEOUT_SECS};

/// Default fallback service endpoint.
pub const DEFAULT_FALLBACK_URL_TEMPLATE: &str = "https://adblockplus.org/getSubscription?version=%VERSION%&url=%SUBSCRIPTION%&downloadURL=%URL%&error=%ERROR%&channelStatus=%CHANNELSTATUS%&responseStatus=%RESPONSESTATUS%";

/// Default number of consecutive failures before the fallback service is consulted.
pub const DEFAULT_FALLBACK_ERROR_THRESHOLD: u32 = 5;

/// Maximum config file size (1 MiB).
const MAX_FILE_SIZE: u64 = 1_048_576;

const KNOWN_KEYS: [&str; 8] = [
    "auto_update",
    "fallback_error_threshold",
    "fallback_url_template",
    "initial_delay_secs",
    "check_interval_secs",
    "connect_timeout_secs",
    "read_timeout_secs",
    "client",
];

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has mistyped values.
    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The file exceeds the size limit.
    #[error("config file is {size} bytes (max {MAX_FILE_SIZE} bytes)")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Offending key.
        field: &'static str,
        /// Offending value.
        value: u64,
        /// Accepted range, for display.
        expected: &'static str,
    },
}

/// Identification of this client, sent with every list request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    /// Product name (`addonName`).
    pub addon_name: String,
    /// Product version (`addonVersion`, also `%VERSION%` in the fallback template).
    pub addon_version: String,
    /// Host application name.
    pub application: String,
    /// Host application version.
    pub application_version: String,
    /// Platform name.
    pub platform: String,
    /// Platform version.
    pub platform_version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        let version = env!("CARGO_PKG_VERSION").to_string();
        Self {
            addon_name: "listsync".to_string(),
            addon_version: version.clone(),
            application: "listsync-cli".to_string(),
            application_version: version,
            platform: env::consts::OS.to_string(),
            platform_version: env::consts::ARCH.to_string(),
        }
    }
}

/// Preferences consumed by the synchronizer and downloader.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// When false, scheduled checks find nothing due. Manual downloads still work.
    pub auto_update: bool,
    /// Consecutive automatic failures before consulting the fallback service.
    pub fallback_error_threshold: u32,
    /// Fallback URL with `%PLACEHOLDER%` tokens.
    pub fallback_url_template: String,
    /// Delay before the first scheduled check.
    pub initial_delay_secs: u64,
    /// Interval between scheduled checks.
    pub check_interval_secs: u64,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout.
    pub read_timeout_secs: u64,
    /// Identification sent with list requests.
    pub client: ClientInfo,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_update: true,
            fallback_error_threshold: DEFAULT_FALLBACK_ERROR_THRESHOLD,
            fallback_url_template: DEFAULT_FALLBACK_URL_TEMPLATE.to_string(),
            initial_delay_secs: INITIAL_DELAY.as_secs(),
            check_interval_secs: CHECK_INTERVAL.as_secs(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            client: ClientInfo::default(),
        }
    }
}

impl SyncConfig {
    /// Loads configuration from a TOML file.
    ///
    /// - Missing file → defaults
    /// - Empty file → defaults
    /// - Unknown keys → logged as warnings
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is too large, is not
    /// valid TOML, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge { size: meta.len() });
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(io_error(e)),
            Ok(_) => {}
        }

        let content = std::fs::read_to_string(path).map_err(io_error)?;
        let config = Self::from_toml(&content)?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::OutOfRange`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    warn!(key = %key, "unknown key in config file, ignoring");
                }
            }
        }

        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback_error_threshold == 0 {
            return Err(ConfigError::OutOfRange {
                field: "fallback_error_threshold",
                value: 0,
                expected: "1..",
            });
        }
        validate_positive("initial_delay_secs", self.initial_delay_secs)?;
        validate_positive("check_interval_secs", self.check_interval_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Delay before the first scheduled check.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Interval between scheduled checks.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn validate_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "1..",
        });
    }
    Ok(())
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "1..=3600",
        });
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/listsync/config.toml`
/// 2. `$HOME/.config/listsync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("listsync")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("listsync")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
