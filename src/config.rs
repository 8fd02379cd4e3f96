//! Process-wide settings and per-request overrides.
//!
//! [`Settings`] is loaded once from a TOML file (or built from defaults) and
//! never mutated afterwards. A [`DownloadRequest`] is produced by merging the
//! settings with a [`RequestOptions`] value: any option that is set wins,
//! everything else falls back to the settings.
//!
//! # Example
//!
//! ```
//! use bulkget_core::config::{RequestOptions, Settings};
//!
//! let settings = Settings::from_toml_str("retry_limit = 2\noverwrite = true\n").unwrap();
//! let request = settings.request(
//!     "https://example.com/a.txt",
//!     &RequestOptions { overwrite: Some(false), ..RequestOptions::default() },
//! );
//! assert_eq!(request.retry_limit, 2);
//! assert!(!request.overwrite);
//! ```

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, MAX_CONCURRENCY, MIN_CONCURRENCY, READ_TIMEOUT_SECS,
};
use crate::download::{
    ArchiveFormat, DEFAULT_CONCURRENCY, DEFAULT_RETRY_DELAY, DownloadRequest, FailurePolicy,
    RenameStrategy, RetryPolicy, TaskOptions,
};

/// Upper bound for `retry_delay_ms`.
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config document is not valid TOML or has unknown keys.
    #[error("failed to parse config {origin}: {source}")]
    Parse {
        /// Where the document came from (file path or `<inline>`).
        origin: String,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {message}")]
    Invalid {
        /// The offending key.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Settings shared by every request in a run.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Settings {
    /// Replace existing files at the destination.
    pub overwrite: bool,
    /// Mint a numbered sibling instead of colliding with an existing file.
    pub always_create_new: bool,
    /// User-Agent sent instead of the built-in one.
    pub user_agent: Option<String>,
    /// Additional attempts after the first failed transfer.
    pub retry_limit: u32,
    /// Pause between transfer attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Basic-auth token in `username:password` form.
    pub credentials: Option<String>,
    /// Archive step applied after each successful download.
    pub archive: ArchiveFormat,
    /// Directory downloads are placed under.
    pub output_dir: Option<PathBuf>,
    /// Maximum number of downloads in flight.
    pub concurrency: usize,
    /// What a failed download does to the rest of the batch.
    pub failure_policy: FailurePolicy,
    /// How auto-renaming counts existing duplicates.
    pub rename_strategy: RenameStrategy,
    /// TCP connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout, in seconds.
    pub read_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overwrite: false,
            always_create_new: false,
            user_agent: None,
            retry_limit: 0,
            retry_delay_ms: u64::try_from(DEFAULT_RETRY_DELAY.as_millis()).unwrap_or(100),
            credentials: None,
            archive: ArchiveFormat::None,
            output_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            failure_policy: FailurePolicy::CollectAll,
            rename_strategy: RenameStrategy::MatchCount,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("overwrite", &self.overwrite)
            .field("always_create_new", &self.always_create_new)
            .field("user_agent", &self.user_agent)
            .field("retry_limit", &self.retry_limit)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("archive", &self.archive)
            .field("output_dir", &self.output_dir)
            .field("concurrency", &self.concurrency)
            .field("failure_policy", &self.failure_policy)
            .field("rename_strategy", &self.rename_strategy)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .finish()
    }
}

impl Settings {
    /// Loads and validates settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is not valid
    /// TOML, contains unknown keys, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&raw, &path.display().to_string())?;
        debug!(path = %path.display(), "config loaded");
        Ok(settings)
    }

    /// Parses and validates settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on malformed TOML, unknown keys, or
    /// out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, "<inline>")
    }

    fn parse(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!(
                    "{}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
                    self.concurrency
                ),
            ));
        }
        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::invalid(
                "retry_delay_ms",
                format!(
                    "{}. Expected range: 0..={MAX_RETRY_DELAY_MS}",
                    self.retry_delay_ms
                ),
            ));
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Returns the pause between transfer attempts.
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the retry policy requests inherit by default.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_limit, self.retry_delay())
    }

    /// Returns the options the engine hands to every task.
    #[must_use]
    pub fn task_options(&self) -> TaskOptions {
        TaskOptions {
            retry_delay: self.retry_delay(),
            rename_strategy: self.rename_strategy,
        }
    }

    /// Builds the request for `url`, letting `options` override these settings.
    #[must_use]
    pub fn request(&self, url: impl Into<String>, options: &RequestOptions) -> DownloadRequest {
        DownloadRequest {
            url: url.into(),
            destination: options.destination.clone(),
            output_dir: options
                .output_dir
                .clone()
                .or_else(|| self.output_dir.clone()),
            overwrite: options.overwrite.unwrap_or(self.overwrite),
            always_create_new: options.always_create_new.unwrap_or(self.always_create_new),
            user_agent: options
                .user_agent
                .clone()
                .or_else(|| self.user_agent.clone()),
            credentials: options
                .credentials
                .clone()
                .or_else(|| self.credentials.clone()),
            retry_limit: options.retry_limit.unwrap_or(self.retry_limit),
            archive: options.archive.unwrap_or(self.archive),
        }
    }

    /// Builds one request per URL, all sharing the same overrides.
    #[must_use]
    pub fn requests_for<I, S>(&self, urls: I, options: &RequestOptions) -> Vec<DownloadRequest>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .map(|url| self.request(url, options))
            .collect()
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("{value}. Expected range: 1..=3600"),
        ));
    }
    Ok(())
}

/// Per-request overrides. Unset fields fall back to [`Settings`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Desired output path; the request-level `FileName`.
    pub destination: Option<PathBuf>,
    /// Directory the destination is placed under.
    pub output_dir: Option<PathBuf>,
    /// Replace an existing file at the destination.
    pub overwrite: Option<bool>,
    /// Mint a numbered sibling instead of colliding.
    pub always_create_new: Option<bool>,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Basic-auth token in `username:password` form.
    pub credentials: Option<String>,
    /// Additional attempts after the first failed transfer.
    pub retry_limit: Option<u32>,
    /// Archive step applied after a successful download.
    pub archive: Option<ArchiveFormat>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("destination", &self.destination)
            .field("output_dir", &self.output_dir)
            .field("overwrite", &self.overwrite)
            .field("always_create_new", &self.always_create_new)
            .field("user_agent", &self.user_agent)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("retry_limit", &self.retry_limit)
            .field("archive", &self.archive)
            .finish()
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bulkget/config.toml`
/// 2. `$HOME/.config/bulkget/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bulkget")
                .join("config.toml"),
        );
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bulkget")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
