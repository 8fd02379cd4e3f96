//! Concurrent batch downloads to local files.
//!
//! This module turns [`DownloadRequest`]s into files on disk: each request
//! resolves a destination, fetches the body through a [`Transport`] with a
//! bounded retry, writes it, and optionally packs it into an archive.
//! [`DownloadEngine`] runs a whole batch concurrently and reports every
//! outcome.
//!
//! # Features
//!
//! - Bounded fan-out (semaphore-capped concurrency)
//! - Collision policy: refuse, overwrite, or auto-rename with a numeric suffix
//! - Fixed-delay retry of transport failures
//! - Optional basic auth and User-Agent override per request
//! - Optional single-entry zip packaging of each finished file
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkget_core::download::{DownloadEngine, DownloadRequest, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(4, Arc::new(HttpClient::new()?))?;
//! let report = engine
//!     .run_all(vec![DownloadRequest::new("https://example.com/paper.pdf")])
//!     .await;
//! for download in report.into_result()? {
//!     println!("Downloaded: {}", download.path.display());
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod client;
pub mod constants;
mod credentials;
mod engine;
mod error;
mod filename;
mod request;
mod retry;
mod task;

pub use archive::{ArchiveError, ArchiveFormat, archive_file};
pub use client::{BodyStream, FetchRequest, HttpClient, Transport};
pub use credentials::Credentials;
pub use engine::{
    BatchReport, DEFAULT_CONCURRENCY, DownloadEngine, EngineError, FailurePolicy, TaskOutcome,
};
pub use error::DownloadError;
pub use filename::{RenameStrategy, count_duplicates, resolve_destination};
pub use request::DownloadRequest;
pub use retry::{DEFAULT_RETRY_DELAY, RetryDecision, RetryPolicy, fetch_with_retry};
pub use task::{DownloadOutcome, TaskOptions, run_task};

// Note: no module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
