//! The unit of work handed to a download task.

use std::fmt;
use std::path::PathBuf;

use super::ArchiveFormat;

/// One resource to fetch and where to put it.
///
/// Built by the caller (usually via [`crate::config::Settings::request`]),
/// consumed by exactly one task, never modified after dispatch.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DownloadRequest {
    /// The URL to fetch.
    pub url: String,
    /// Desired output path. `None` or empty derives the name from the URL.
    pub destination: Option<PathBuf>,
    /// Directory the destination is placed under; created if missing.
    pub output_dir: Option<PathBuf>,
    /// Replace an existing file at the destination.
    pub overwrite: bool,
    /// Mint a numbered sibling instead of colliding with an existing file.
    pub always_create_new: bool,
    /// Overrides the transport's default User-Agent.
    pub user_agent: Option<String>,
    /// Basic-auth token in `username:password` form.
    pub credentials: Option<String>,
    /// Additional attempts after the first failed transfer.
    pub retry_limit: u32,
    /// Archive step applied after a successful download.
    pub archive: ArchiveFormat,
}

impl DownloadRequest {
    /// Creates a request for `url` with every option at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("url", &self.url)
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
