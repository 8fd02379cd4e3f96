//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bulkget_core::{ArchiveFormat, FailurePolicy, RequestOptions, Settings};

/// Batch download files from lists of URLs.
///
/// Locators are taken from the positional arguments, from a text file
/// (`--input`), or from piped stdin. Existing files are never replaced
/// unless `--overwrite` or `--always-new` says otherwise.
#[derive(Parser, Debug)]
#[command(name = "bulkget")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download
    #[arg(value_name = "URLS")]
    pub urls: Vec<String>,

    /// Text file to scan for http, https and ftp locators
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// TOML config file (default: $XDG_CONFIG_HOME/bulkget/config.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to place downloads in (created if missing)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Replace files that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Save as name_N.ext instead of colliding with an existing file
    #[arg(long)]
    pub always_new: bool,

    /// User-Agent header to send
    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    /// Extra attempts after a failed transfer (0-100)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(0..=100))]
    pub retries: Option<u32>,

    /// Basic auth credentials
    #[arg(long, value_name = "USER:PASS")]
    pub auth: Option<String>,

    /// Pack each finished download into an archive (zip or none)
    #[arg(long, value_name = "FORMAT")]
    pub archive: Option<ArchiveFormat>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Cancel remaining downloads after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Returns the default log filter for the verbosity flags.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    /// Overlays the batch-level flags onto loaded settings.
    #[must_use]
    pub fn apply_to(&self, settings: Settings) -> Settings {
        Settings {
            concurrency: self
                .concurrency
                .map_or(settings.concurrency, usize::from),
            failure_policy: if self.fail_fast {
                FailurePolicy::FailFast
            } else {
                settings.failure_policy
            },
            ..settings
        }
    }

    /// Returns the per-request overrides given on the command line.
    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            destination: None,
            output_dir: self.output_dir.clone(),
            overwrite: self.overwrite.then_some(true),
            always_create_new: self.always_new.then_some(true),
            user_agent: self.user_agent.clone(),
            credentials: self.auth.clone(),
            retry_limit: self.retries,
            archive: self.archive,
        }
    }
}
