//! One request, end to end: resolve, fetch with retry, write, archive.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::archive::{ArchiveFormat, archive_file};
use super::client::{FetchRequest, Transport, read_body};
use super::credentials::Credentials;
use super::constants::MAX_RENAME_ATTEMPTS;
use super::filename::{
    RenameStrategy, candidate_path, count_duplicates, numbered_sibling, resolve_destination,
};
use super::retry::{DEFAULT_RETRY_DELAY, RetryPolicy, fetch_with_retry};
use super::{DownloadError, DownloadRequest};

/// Engine-wide knobs every task shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Fixed pause between transfer attempts.
    pub retry_delay: Duration,
    /// How auto-renaming counts existing duplicates.
    pub rename_strategy: RenameStrategy,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            rename_strategy: RenameStrategy::default(),
        }
    }
}

/// What a successful task produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// The URL that was fetched.
    pub url: String,
    /// Where the body was written. Removed again if `archive` is set.
    pub path: PathBuf,
    /// Bytes written to `path`.
    pub bytes: u64,
    /// Transfer attempts used, the successful one included.
    pub attempts: u32,
    /// The archive that replaced `path`, when archiving succeeded.
    pub archive: Option<PathBuf>,
}

/// Runs one download request to completion.
///
/// Order of side effects:
/// 1. credentials are validated (no network, no filesystem)
/// 2. the output directory is created if it does not exist
/// 3. the destination is resolved
/// 4. the transfer is attempted under the request's retry limit
/// 5. the destination is created, only once a response is in hand; without
///    `overwrite` the name is claimed exclusively, so a file that appeared
///    during the transfer is never truncated
/// 6. the whole body is read into memory and written in one pass; a body or
///    write failure removes the file again
/// 7. the archive step runs; its failure is logged and the original kept
///
/// # Errors
///
/// Returns the first [`DownloadError`] from steps 1 through 6.
#[instrument(skip(request, transport, options), fields(url = %request.url))]
pub async fn run_task(
    request: &DownloadRequest,
    transport: &dyn Transport,
    options: &TaskOptions,
) -> Result<DownloadOutcome, DownloadError> {
    let started = Instant::now();
    let credentials = request
        .credentials
        .as_deref()
        .map(Credentials::parse)
        .transpose()?;

    if let Some(dir) = &request.output_dir {
        ensure_output_dir(dir).await?;
    }

    let path = resolve_destination(request, options.rename_strategy)?;
    info!(path = %path.display(), "starting download");

    let fetch = FetchRequest {
        url: &request.url,
        user_agent: request.user_agent.as_deref(),
        credentials: credentials.as_ref(),
    };
    let policy = RetryPolicy::new(request.retry_limit, options.retry_delay);
    let (body, attempts) =
        fetch_with_retry(&request.url, &policy, move |_| transport.get(fetch)).await?;

    let (mut file, path) = open_destination(request, path, options.rename_strategy).await?;

    let contents = match read_body(body).await {
        Ok(contents) => contents,
        Err(e) => {
            drop(file);
            discard_partial(&path).await;
            return Err(e);
        }
    };

    if let Err(e) = write_contents(&mut file, &contents).await {
        drop(file);
        discard_partial(&path).await;
        return Err(DownloadError::io(path, e));
    }
    drop(file);

    let bytes = contents.len() as u64;
    info!(
        path = %path.display(),
        bytes,
        attempts,
        elapsed_ms = started.elapsed().as_millis(),
        "download complete"
    );

    let archive = archive_download(&path, request.archive).await;

    Ok(DownloadOutcome {
        url: request.url.clone(),
        path,
        bytes,
        attempts,
        archive,
    })
}

async fn ensure_output_dir(dir: &Path) -> Result<(), DownloadError> {
    if tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(());
    }
    debug!(dir = %dir.display(), "creating output directory");
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::io(dir, e))
}

/// Creates the destination file.
///
/// With `overwrite` (and no auto-rename) an existing file is truncated.
/// Otherwise the name is claimed with `create_new`: if another writer took
/// it since [`resolve_destination`] ran, the request fails with
/// [`DownloadError::AlreadyExists`], or under `always_create_new` steps to
/// the next free numbered sibling.
async fn open_destination(
    request: &DownloadRequest,
    mut path: PathBuf,
    strategy: RenameStrategy,
) -> Result<(File, PathBuf), DownloadError> {
    if request.overwrite && !request.always_create_new {
        let file = File::create(&path)
            .await
            .map_err(|e| DownloadError::io(path.clone(), e))?;
        return Ok((file, path));
    }

    let mut last_index = None;
    for _ in 0..MAX_RENAME_ATTEMPTS {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !request.always_create_new {
                    return Err(DownloadError::already_exists(path));
                }
                let candidate = candidate_path(request)?;
                let mut index = match last_index {
                    Some(index) => index + 1,
                    None => count_duplicates(&candidate, strategy)? + 1,
                };
                let mut next = numbered_sibling(&candidate, index);
                if next == path {
                    index += 1;
                    next = numbered_sibling(&candidate, index);
                }
                debug!(taken = %path.display(), path = %next.display(), "destination taken, trying next name");
                last_index = Some(index);
                path = next;
            }
            Err(e) => return Err(DownloadError::io(path, e)),
        }
    }
    Err(DownloadError::already_exists(path))
}

async fn write_contents(file: &mut File, contents: &[u8]) -> io::Result<()> {
    file.write_all(contents).await?;
    file.flush().await
}

/// Removes a file left behind by a failed task.
async fn discard_partial(path: &Path) {
    debug!(path = %path.display(), "removing incomplete download");
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove incomplete download");
    }
}

/// Archives a finished download. Never fails the task.
async fn archive_download(path: &Path, format: ArchiveFormat) -> Option<PathBuf> {
    match archive_file(path, format).await {
        Ok(Some(archive)) => {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "failed to remove original after archiving");
            }
            info!(archive = %archive.display(), "output archived");
            Some(archive)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "archive step failed; keeping original file");
            None
        }
    }
}
