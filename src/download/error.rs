//! Error types for the download module.
//!
//! This module defines structured errors for all download operations,
//! providing context-rich error messages for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during file downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The destination already exists and neither overwrite nor auto-rename is allowed.
    #[error(
        "file {path} already exists; enable overwrite or always-create-new to replace or rename it"
    )]
    AlreadyExists {
        /// The colliding destination path.
        path: PathBuf,
    },

    /// Basic-auth credentials were not in `username:password` form.
    #[error("authentication must be in the format username:password")]
    InvalidCredentials,

    /// Every transfer attempt failed.
    #[error("giving up on {url} after {attempts} attempts: {source}")]
    TransferExhausted {
        /// The URL that could not be fetched.
        url: String,
        /// Total number of attempts made (initial attempt included).
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        source: Box<DownloadError>,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create dir, create file, write, etc.)
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The task was aborted because a sibling failed under fail-fast policy.
    #[error("download of {url} cancelled after another download failed")]
    Cancelled {
        /// The URL whose task was cancelled.
        url: String,
    },

    /// The task panicked before reporting a result.
    #[error("download task for {url} panicked: {message}")]
    TaskPanicked {
        /// The URL whose task panicked.
        url: String,
        /// Panic description from the runtime.
        message: String,
    },
}

impl DownloadError {
    /// Creates a destination collision error.
    pub fn already_exists(path: impl Into<PathBuf>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    /// Creates a retry-exhaustion error wrapping the last attempt's failure.
    pub fn transfer_exhausted(url: impl Into<String>, attempts: u32, last: DownloadError) -> Self {
        Self::TransferExhausted {
            url: url.into(),
            attempts,
            source: Box::new(last),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns true for transport failures another attempt might fix.
    ///
    /// Network errors and timeouts qualify, as do HTTP 5xx, 408 and 429.
    /// Other 4xx responses, local validation and filesystem errors do not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || matches!(*status, 408 | 429),
            _ => false,
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because our error variants require context (url, path) that the source errors
// don't provide. The helper constructor methods are used instead.
