//! Post-download packaging of a completed file into a single-entry archive.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use zip::CompressionMethod;
use zip::write::FileOptions;

/// Archive format applied after a successful download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// Leave the downloaded file as is.
    #[default]
    None,
    /// Pack into `<file>.zip` with one deflated entry.
    Zip,
}

impl ArchiveFormat {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "zip" => Ok(Self::Zip),
            other => Err(format!("unsupported archive format '{other}' (expected zip or none)")),
        }
    }
}

/// Errors from the archive step. These never fail a download.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Reading the source or writing the archive failed.
    #[error("IO error archiving {path}: {source}")]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The zip writer rejected the entry.
    #[error("zip error archiving {path}: {source}")]
    Zip {
        /// The archive being written.
        path: PathBuf,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The blocking archive job did not complete.
    #[error("archive job for {path} did not complete: {message}")]
    Interrupted {
        /// The file being archived.
        path: PathBuf,
        /// Runtime description of the failure.
        message: String,
    },
}

/// Packs `path` according to `format`, writing the archive beside it.
///
/// Returns the archive path, or `None` for [`ArchiveFormat::None`]. The
/// source file is left untouched; deleting it is the caller's decision.
/// An existing `<file>.zip` is never replaced: creating the archive fails
/// with [`ArchiveError::Io`] instead. A partially written archive is
/// removed on failure.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the archive cannot be produced.
#[instrument(skip(path), fields(path = %path.display()))]
pub async fn archive_file(
    path: &Path,
    format: ArchiveFormat,
) -> Result<Option<PathBuf>, ArchiveError> {
    match format {
        ArchiveFormat::None => Ok(None),
        ArchiveFormat::Zip => {
            let source = path.to_path_buf();
            tokio::task::spawn_blocking(move || zip_single_file(&source))
                .await
                .map_err(|e| ArchiveError::Interrupted {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
                .map(Some)
        }
    }
}

fn zip_single_file(path: &Path) -> Result<PathBuf, ArchiveError> {
    let mut archive_name = path.as_os_str().to_owned();
    archive_name.push(".zip");
    let archive_path = PathBuf::from(archive_name);

    let source = File::open(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // An existing archive is never truncated or removed.
    let archive = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&archive_path)
        .map_err(|source| ArchiveError::Io {
            path: archive_path.clone(),
            source,
        })?;

    let result = write_zip(path, source, archive, &archive_path);
    if result.is_err()
        && let Err(e) = std::fs::remove_file(&archive_path)
    {
        warn!(archive = %archive_path.display(), error = %e, "failed to remove partial archive");
    }
    result.map(|()| archive_path)
}

fn write_zip(
    path: &Path,
    source: File,
    archive: File,
    archive_path: &Path,
) -> Result<(), ArchiveError> {
    let io_err = |source: std::io::Error| ArchiveError::Io {
        path: archive_path.to_path_buf(),
        source,
    };
    let zip_err = |source: zip::result::ZipError| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };

    let entry_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    let mut source = BufReader::new(source);
    let mut writer = zip::ZipWriter::new(BufWriter::new(archive));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(entry_name, options).map_err(zip_err)?;
    let copied = std::io::copy(&mut source, &mut writer).map_err(io_err)?;
    let mut inner = writer.finish().map_err(zip_err)?;
    std::io::Write::flush(&mut inner).map_err(io_err)?;

    debug!(archive = %archive_path.display(), bytes = copied, "archive written");
    Ok(())
}
