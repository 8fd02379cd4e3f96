//! Error types for locator extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading a locator document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document could not be read.
    #[error("failed to read locator file '{path}': {source}\n  Suggestion: Check the path and file permissions")]
    Io {
        /// The document path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    /// Creates an `Io` error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
