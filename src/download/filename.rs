//! Destination path resolution and duplicate naming for downloads.
//!
//! [`resolve_destination`] decides, for one request, whether the download
//! goes to the requested path, to an auto-renamed sibling, or nowhere
//! ([`DownloadError::AlreadyExists`]). Renaming asks [`count_duplicates`]
//! how many `<stem>_*<ext>` siblings already exist and appends `_<count + 1>`.
//!
//! Neither function creates or deletes anything; they only stat and list.
//! The answer can go stale before the file is created, so the download task
//! creates its file exclusively and comes back here when it loses a race.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument};
use url::Url;

use super::{DownloadError, DownloadRequest};

/// How the duplicate counter turns existing siblings into a count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenameStrategy {
    /// Count every sibling matching `<stem>_*<ext>`, plus one.
    ///
    /// Gaps in existing numbering are not detected: with `a_1.txt` and
    /// `a_5.txt` present the count is 3 and the next mint is `a_4.txt`.
    /// The minted name can collide with a sibling that was numbered out of
    /// order; the download task then steps to the next free index.
    #[default]
    MatchCount,
    /// Use the largest numeric suffix among matching siblings (at least 1).
    ///
    /// With `a_1.txt` and `a_5.txt` present the count is 5 and the next
    /// mint is `a_6.txt`.
    MaxIndex,
}

/// Resolves the final destination path for one download request.
///
/// The candidate is the request's destination hint, or the last path
/// segment of its URL when no hint is given, joined under the request's
/// output directory when one is configured. Then:
///
/// - candidate missing: use it
/// - candidate present and `always_create_new`: mint `<stem>_<n><ext>` in
///   the same directory, `n` being [`count_duplicates`] + 1
/// - candidate present and not `overwrite`: [`DownloadError::AlreadyExists`]
/// - candidate present and `overwrite`: use it (it will be truncated)
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] when a name has to be derived from an
/// unparseable URL, [`DownloadError::AlreadyExists`] on a forbidden collision,
/// and [`DownloadError::Io`] when the directory listing for renaming fails.
#[instrument(skip(request), fields(url = %request.url))]
pub fn resolve_destination(
    request: &DownloadRequest,
    strategy: RenameStrategy,
) -> Result<PathBuf, DownloadError> {
    let candidate = candidate_path(request)?;

    if !candidate.exists() {
        debug!(path = %candidate.display(), "destination is free");
        return Ok(candidate);
    }

    if request.always_create_new {
        let minted = mint_duplicate_name(&candidate, strategy)?;
        debug!(
            existing = %candidate.display(),
            path = %minted.display(),
            "destination exists, minted new name"
        );
        return Ok(minted);
    }

    if !request.overwrite {
        return Err(DownloadError::already_exists(candidate));
    }

    debug!(path = %candidate.display(), "destination exists, will overwrite");
    Ok(candidate)
}

/// Counts siblings of `path` that look like its numbered duplicates.
///
/// Lists the parent directory and counts entries whose name matches
/// `<stem>_*<ext>` (or `<stem>_*` when there is no extension), files and
/// directories alike, then applies `strategy`. The result is always at
/// least 1.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the parent directory cannot be listed.
pub fn count_duplicates(path: &Path, strategy: RenameStrategy) -> Result<usize, DownloadError> {
    let dir = parent_dir(path);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension(&file_name);
    let prefix = format!("{stem}_");

    let entries = std::fs::read_dir(dir).map_err(|e| DownloadError::io(dir, e))?;

    let mut matches = 0usize;
    let mut max_index = 0usize;
    for entry in entries {
        let entry = entry.map_err(|e| DownloadError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(middle) = match_duplicate_pattern(&name, &prefix, ext) else {
            continue;
        };
        matches += 1;
        if let Ok(index) = middle.parse::<usize>() {
            max_index = max_index.max(index);
        }
    }

    let count = match strategy {
        RenameStrategy::MatchCount => matches + 1,
        RenameStrategy::MaxIndex => max_index.max(1),
    };
    let pattern = format!("{prefix}*{ext}");
    debug!(dir = %dir.display(), %pattern, matches, count, "counted duplicates");
    Ok(count)
}

/// The path a request asks for before any collision handling.
pub(crate) fn candidate_path(request: &DownloadRequest) -> Result<PathBuf, DownloadError> {
    let name = match request
        .destination
        .as_ref()
        .filter(|hint| !hint.as_os_str().is_empty())
    {
        Some(hint) => hint.clone(),
        None => {
            let parsed = Url::parse(&request.url)
                .map_err(|_| DownloadError::invalid_url(request.url.clone()))?;
            PathBuf::from(filename_from_url(&parsed))
        }
    };

    Ok(match &request.output_dir {
        Some(dir) => dir.join(name),
        None => name,
    })
}

fn mint_duplicate_name(path: &Path, strategy: RenameStrategy) -> Result<PathBuf, DownloadError> {
    let count = count_duplicates(path, strategy)?;
    Ok(numbered_sibling(path, count + 1))
}

/// `<stem>_<index><ext>` beside `path`.
pub(crate) fn numbered_sibling(path: &Path, index: usize) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension(&file_name);
    let numbered = format!("{stem}_{index}{ext}");
    match path.parent() {
        Some(parent) => parent.join(numbered),
        None => PathBuf::from(numbered),
    }
}

/// Returns the text the `*` wildcard matched, if `name` fits `<prefix>*<ext>`.
fn match_duplicate_pattern<'a>(name: &'a str, prefix: &str, ext: &str) -> Option<&'a str> {
    if name.len() < prefix.len() + ext.len() {
        return None;
    }
    let rest = name.strip_prefix(prefix)?;
    rest.strip_suffix(ext)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Splits `name` into stem and extension; the extension keeps its dot.
///
/// A leading dot alone (`.env`) is not treated as an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

/// Default filename derived from the URL's last path segment, or
/// `download_<timestamp>.bin` when the path has no usable segment.
pub(crate) fn filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).map_or_else(
            |e| {
                debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
                last.to_string()
            },
            std::borrow::Cow::into_owned,
        );
        return sanitize_filename(&decoded);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}.bin")
}

/// Sanitizes a derived filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems
/// (`/ \ : * ? " < > |`) and rewrites bare dot segments.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(url: &str, dir: &Path) -> DownloadRequest {
        DownloadRequest {
            output_dir: Some(dir.to_path_buf()),
            ..DownloadRequest::new(url)
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    // ==================== Duplicate Counter Tests ====================

    #[test]
    fn test_count_duplicates_no_siblings_is_one() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "report.pdf");
        let count =
            count_duplicates(&temp_dir.path().join("report.pdf"), RenameStrategy::MatchCount)
                .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_count_duplicates_is_siblings_plus_one() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["report.pdf", "report_1.pdf", "report_2.pdf", "report_x.pdf"] {
            touch(temp_dir.path(), name);
        }
        // Non-matching neighbours
        for name in ["report_3.txt", "other_1.pdf", "report.pdf.bak"] {
            touch(temp_dir.path(), name);
        }

        let count =
            count_duplicates(&temp_dir.path().join("report.pdf"), RenameStrategy::MatchCount)
                .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_count_duplicates_counts_directories_too() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("data_old")).unwrap();
        let count =
            count_duplicates(&temp_dir.path().join("data"), RenameStrategy::MatchCount).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_count_duplicates_is_gap_blind_by_default() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.txt", "a_1.txt", "a_5.txt"] {
            touch(temp_dir.path(), name);
        }
        let path = temp_dir.path().join("a.txt");
        assert_eq!(count_duplicates(&path, RenameStrategy::MatchCount).unwrap(), 3);
        assert_eq!(count_duplicates(&path, RenameStrategy::MaxIndex).unwrap(), 5);
    }

    #[test]
    fn test_count_duplicates_max_index_floor_is_one() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "a.txt");
        touch(temp_dir.path(), "a_copy.txt");
        let path = temp_dir.path().join("a.txt");
        assert_eq!(count_duplicates(&path, RenameStrategy::MaxIndex).unwrap(), 1);
    }

    #[test]
    fn test_count_duplicates_missing_dir_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("a.txt");
        assert!(matches!(
            count_duplicates(&path, RenameStrategy::MatchCount),
            Err(DownloadError::Io { .. })
        ));
    }

    // ==================== Path Resolver Tests ====================

    #[test]
    fn test_resolve_derives_name_from_url() {
        let temp_dir = TempDir::new().unwrap();
        let req = request("https://example.com/files/paper.pdf?x=1", temp_dir.path());
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("paper.pdf"));
    }

    #[test]
    fn test_resolve_decodes_derived_name() {
        let temp_dir = TempDir::new().unwrap();
        let req = request("https://example.com/my%20file.txt", temp_dir.path());
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("my file.txt"));
    }

    #[test]
    fn test_resolve_uses_hint_when_present() {
        let temp_dir = TempDir::new().unwrap();
        let req = DownloadRequest {
            destination: Some(PathBuf::from("renamed.bin")),
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("renamed.bin"));
    }

    #[test]
    fn test_resolve_empty_hint_falls_back_to_url() {
        let temp_dir = TempDir::new().unwrap();
        let req = DownloadRequest {
            destination: Some(PathBuf::new()),
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("paper.pdf"));
    }

    #[test]
    fn test_resolve_existing_without_overwrite_fails() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "paper.pdf");
        let req = request("https://example.com/paper.pdf", temp_dir.path());
        match resolve_destination(&req, RenameStrategy::default()) {
            Err(DownloadError::AlreadyExists { path }) => {
                assert_eq!(path, temp_dir.path().join("paper.pdf"));
            }
            other => panic!("Expected AlreadyExists, got: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_existing_hint_without_overwrite_fails() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "out.txt");
        let req = DownloadRequest {
            destination: Some(PathBuf::from("out.txt")),
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        assert!(matches!(
            resolve_destination(&req, RenameStrategy::default()),
            Err(DownloadError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_resolve_existing_with_overwrite_keeps_path() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "paper.pdf");
        let req = DownloadRequest {
            overwrite: true,
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("paper.pdf"));
    }

    #[test]
    fn test_resolve_always_new_mints_suffix_before_extension() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "paper.pdf");
        let req = DownloadRequest {
            always_create_new: true,
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("paper_2.pdf"));
    }

    #[test]
    fn test_resolve_always_new_wins_over_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "paper.pdf");
        let req = DownloadRequest {
            always_create_new: true,
            overwrite: true,
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_ne!(path, temp_dir.path().join("paper.pdf"));
    }

    #[test]
    fn test_resolve_always_new_counts_existing_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["paper.pdf", "paper_2.pdf", "paper_3.pdf"] {
            touch(temp_dir.path(), name);
        }
        let req = DownloadRequest {
            always_create_new: true,
            ..request("https://example.com/paper.pdf", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("paper_4.pdf"));
    }

    #[test]
    fn test_resolve_always_new_without_extension() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "LICENSE");
        let req = DownloadRequest {
            always_create_new: true,
            destination: Some(PathBuf::from("LICENSE")),
            ..request("https://example.com/x", temp_dir.path())
        };
        let path = resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(path, temp_dir.path().join("LICENSE_2"));
    }

    #[test]
    fn test_resolve_always_new_max_index_skips_gap() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.txt", "a_1.txt", "a_5.txt"] {
            touch(temp_dir.path(), name);
        }
        let req = DownloadRequest {
            always_create_new: true,
            ..request("https://example.com/a.txt", temp_dir.path())
        };
        let by_count = resolve_destination(&req, RenameStrategy::MatchCount).unwrap();
        let by_index = resolve_destination(&req, RenameStrategy::MaxIndex).unwrap();
        assert_eq!(by_count, temp_dir.path().join("a_4.txt"));
        assert_eq!(by_index, temp_dir.path().join("a_6.txt"));
    }

    #[test]
    fn test_resolve_invalid_url_without_hint() {
        let req = DownloadRequest::new("not a url");
        assert!(matches!(
            resolve_destination(&req, RenameStrategy::default()),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_resolve_never_touches_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        let req = request("https://example.com/paper.pdf", temp_dir.path());
        resolve_destination(&req, RenameStrategy::default()).unwrap();
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    // ==================== Filename Helper Tests ====================

    #[test]
    fn test_filename_from_url_without_segment_falls_back() {
        let url = Url::parse("https://example.com/").unwrap();
        let name = filename_from_url(&url);
        assert!(name.starts_with("download_"), "got {name}");
        assert!(name.ends_with(".bin"), "got {name}");
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file:name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("file|name.pdf"), "file_name.pdf");
        assert_eq!(sanitize_filename("a/b"), "a_b");
    }

    #[test]
    fn test_sanitize_filename_rewrites_dot_segments() {
        assert_eq!(sanitize_filename("."), "_");
        assert_eq!(sanitize_filename(".."), "__");
    }

    #[test]
    fn test_numbered_sibling_keeps_extension_and_parent() {
        let base = Path::new("/data/out/report.tar.gz");
        assert_eq!(numbered_sibling(base, 7), Path::new("/data/out/report.tar_7.gz"));
        assert_eq!(numbered_sibling(Path::new("LICENSE"), 2), Path::new("LICENSE_2"));
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }
}
