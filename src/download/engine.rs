//! Download engine for concurrent batches of download requests.
//!
//! This module provides the `DownloadEngine` which fans a batch of
//! [`DownloadRequest`]s out to Tokio tasks, caps how many run at once with a
//! semaphore, and joins every task before reporting.
//!
//! # Overview
//!
//! Every request becomes one task running [`run_task`]. The engine never
//! returns early: [`DownloadEngine::run_all`] is a barrier that resolves only
//! once each task has terminated, and yields a [`BatchReport`] holding one
//! [`TaskOutcome`] per request, in input order.
//!
//! What a failure does to its siblings is set by [`FailurePolicy`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkget_core::download::{DownloadEngine, DownloadRequest, FailurePolicy, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(10, Arc::new(HttpClient::new()?))?
//!     .with_failure_policy(FailurePolicy::FailFast);
//! let report = engine
//!     .run_all(vec![DownloadRequest::new("https://example.com/a.pdf")])
//!     .await;
//! println!("Completed: {}, Failed: {}", report.completed(), report.failed());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::filename::RenameStrategy;
use super::task::{DownloadOutcome, TaskOptions, run_task};
use super::{DownloadError, DownloadRequest, Transport};

/// Default concurrency if not specified.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Error type for download engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// What one failed task does to the rest of the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Every task runs to completion; failures are only reported.
    #[default]
    CollectAll,
    /// The first failure cancels every task still waiting or running.
    /// Cancelled tasks report [`DownloadError::Cancelled`].
    FailFast,
}

/// Result of one request in a batch.
#[derive(Debug)]
pub struct TaskOutcome {
    /// The URL of the request.
    pub url: String,
    /// What the task produced.
    pub result: Result<DownloadOutcome, DownloadError>,
}

impl TaskOutcome {
    /// Returns true if the task was cancelled by a sibling's failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, Err(DownloadError::Cancelled { .. }))
    }
}

/// Per-request results of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    /// Returns all outcomes in input order.
    #[must_use]
    pub fn outcomes(&self) -> &[TaskOutcome] {
        &self.outcomes
    }

    /// Returns the number of successful downloads.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Returns the number of failed downloads, cancellations excluded.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err() && !o.is_cancelled())
            .count()
    }

    /// Returns the number of downloads cancelled under fail-fast.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_cancelled()).count()
    }

    /// Returns the total number of requests in the batch.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns the number of extra transfer attempts spent by successful downloads.
    #[must_use]
    pub fn retried(&self) -> u32 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|d| d.attempts.saturating_sub(1))
            .sum()
    }

    /// Returns true if no request failed or was cancelled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Returns the first real failure (not a cancellation), in input order.
    #[must_use]
    pub fn first_failure(&self) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.result.is_err() && !o.is_cancelled())
    }

    /// Collapses the report into all-or-nothing form.
    ///
    /// # Errors
    ///
    /// Returns the first real failure in input order, or a cancellation if
    /// that is all there is.
    pub fn into_result(self) -> Result<Vec<DownloadOutcome>, DownloadError> {
        let mut downloads = Vec::with_capacity(self.outcomes.len());
        let mut cancellation = None;
        for outcome in self.outcomes {
            match outcome.result {
                Ok(download) => downloads.push(download),
                Err(e @ DownloadError::Cancelled { .. }) => {
                    cancellation.get_or_insert(e);
                }
                Err(e) => return Err(e),
            }
        }
        match cancellation {
            Some(e) => Err(e),
            None => Ok(downloads),
        }
    }
}

/// Download engine for concurrent batches.
///
/// The engine uses a semaphore to limit the number of concurrent downloads,
/// preventing resource exhaustion on large batches.
///
/// # Concurrency Model
///
/// - Each request runs in its own Tokio task, all spawned up front
/// - A semaphore permit is acquired inside the task before any work
/// - Permits are released automatically when tasks complete (RAII)
/// - Tasks share nothing but the transport and the filesystem; two requests
///   resolving to the same destination at the same moment can race
pub struct DownloadEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Network transport shared by all tasks.
    transport: Arc<dyn Transport>,
    /// Options passed to every task.
    task_options: TaskOptions,
    /// Reaction to a failed task.
    failure_policy: FailurePolicy,
}

impl fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("concurrency", &self.concurrency)
            .field("task_options", &self.task_options)
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Creates a new download engine with the specified concurrency limit
    /// and transport.
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Maximum number of concurrent downloads (1-100)
    /// * `transport` - Network transport shared by all tasks
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(transport))]
    pub fn new(concurrency: usize, transport: Arc<dyn Transport>) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating download engine");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            transport,
            task_options: TaskOptions::default(),
            failure_policy: FailurePolicy::default(),
        })
    }

    /// Sets the reaction to a failed task.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Sets how auto-renaming counts existing duplicates.
    #[must_use]
    pub fn with_rename_strategy(mut self, rename_strategy: RenameStrategy) -> Self {
        self.task_options.rename_strategy = rename_strategy;
        self
    }

    /// Sets the fixed pause between transfer attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.task_options.retry_delay = retry_delay;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Returns the options every task runs with.
    #[must_use]
    pub fn task_options(&self) -> TaskOptions {
        self.task_options
    }

    /// Runs every request and waits for all of them.
    ///
    /// Returns only after each spawned task has terminated, whatever the
    /// failure policy. Individual failures do not make this method fail;
    /// they are recorded in the report.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn run_all(&self, requests: Vec<DownloadRequest>) -> BatchReport {
        let fail_fast = self.failure_policy == FailurePolicy::FailFast;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let mut handles = Vec::with_capacity(requests.len());

        info!(concurrency = self.concurrency, "starting batch");

        for request in requests {
            let url = request.url.clone();
            let semaphore = Arc::clone(&self.semaphore);
            let transport = Arc::clone(&self.transport);
            let options = self.task_options;
            let cancel_tx = Arc::clone(&cancel_tx);
            let mut cancel_rx = cancel_rx.clone();

            let handle = tokio::spawn(async move {
                let work = async {
                    match semaphore.acquire_owned().await {
                        // Permit is dropped when this arm exits (RAII)
                        Ok(_permit) => run_task(&request, transport.as_ref(), &options).await,
                        Err(_) => Err(DownloadError::cancelled(&request.url)),
                    }
                };

                let cancelled = async {
                    // The sender outlives every task, so this only resolves on cancel
                    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
                };

                let result = tokio::select! {
                    result = work => result,
                    () = cancelled => {
                        debug!(url = %request.url, "download cancelled");
                        Err(DownloadError::cancelled(&request.url))
                    }
                };

                if fail_fast
                    && let Err(e) = &result
                    && !matches!(e, DownloadError::Cancelled { .. })
                {
                    warn!(url = %request.url, error = %e, "download failed; cancelling remaining downloads");
                    cancel_tx.send_replace(true);
                }
                result
            });
            handles.push((url, handle));
        }

        debug!(
            task_count = handles.len(),
            "waiting for downloads to complete"
        );

        let mut outcomes = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(url = %url, error = %e, "download task panicked");
                    if fail_fast {
                        cancel_tx.send_replace(true);
                    }
                    Err(DownloadError::TaskPanicked {
                        url: url.clone(),
                        message: e.to_string(),
                    })
                }
            };
            debug!(url = %url, ok = result.is_ok(), "download task joined");
            outcomes.push(TaskOutcome { url, result });
        }

        let report = BatchReport { outcomes };
        info!(
            completed = report.completed(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            retried = report.retried(),
            total = report.total(),
            "batch complete"
        );
        report
    }
}
