//! Bulkget Core Library
//!
//! This library provides the core functionality for the bulkget tool,
//! which fetches batches of remote files and persists them to a local
//! destination with a configurable collision policy.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Process-wide settings and per-request overrides
//! - [`download`] - Destination resolution, retrying transfers, batch engine
//! - [`parser`] - Locator extraction from text documents

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod parser;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, RequestOptions, Settings};
pub use download::{
    ArchiveFormat, BatchReport, Credentials, DEFAULT_CONCURRENCY, DEFAULT_RETRY_DELAY,
    DownloadEngine, DownloadError, DownloadOutcome, DownloadRequest, EngineError, FailurePolicy,
    HttpClient, RenameStrategy, RetryPolicy, TaskOutcome, Transport,
};
pub use parser::{ParseError, dedup_locators, extract_locators, load_locators};
