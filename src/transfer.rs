//! HTTP download implementation
//!
//! One GET, one body stream, one file: the body is streamed into
//! `<destination>.tmp` through a [`ProgressWriter`] and only renamed onto the
//! destination once every byte is on disk.

use reqwest::{
    blocking::Client,
    header::{self, HeaderMap, HeaderValue},
};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::progress::{ProgressOutput, ProgressReporter, ProgressWriter, bytes_per_second};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Outcome of a finished download
#[derive(Debug, Clone)]
pub struct DownloadReport {
    /// Final path of the downloaded file
    pub path: PathBuf,
    /// Bytes written to disk
    pub bytes: u64,
    /// Size announced by the server, if any
    pub content_length: Option<u64>,
    pub elapsed: Duration,
}

impl DownloadReport {
    pub fn bytes_per_second(&self) -> f64 {
        bytes_per_second(self.bytes, self.elapsed)
    }
}

pub struct Downloader {
    client: Client,
    output: ProgressOutput,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        // No timeout: a stalled transfer waits until the process is killed
        let client = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(None::<Duration>)
            .no_proxy()
            .build()
            .map_err(DownloadError::Client)?;

        Ok(Self {
            client,
            output: ProgressOutput::default(),
        })
    }

    pub fn with_progress_output(mut self, output: ProgressOutput) -> Self {
        self.output = output;
        self
    }

    /// Downloads `config.url` to `config.destination`.
    ///
    /// The destination only ever appears complete. On any failure the
    /// temporary file is removed and the destination is left untouched.
    #[instrument(name = "download_file", level = "debug", skip(self, config), fields(url = %config.url, path = ?config.destination))]
    pub fn download(&self, config: &DownloadConfig) -> Result<DownloadReport> {
        let temp_path = config.temp_path();

        // Before any request goes out, so an unwritable destination costs no traffic
        let file = File::create(&temp_path).map_err(|source| DownloadError::CreateTemp {
            path: temp_path.clone(),
            source,
        })?;
        debug!(path = ?temp_path, "Created temporary file");

        self.fetch_into(config, file, &temp_path).inspect_err(|e| {
            // main reports the error itself
            debug!(error = %e, "Download failed");
            discard(&temp_path);
        })
    }

    fn fetch_into(&self, config: &DownloadConfig, mut file: File, temp_path: &Path) -> Result<DownloadReport> {
        let response = self
            .client
            .get(&config.url)
            .send()
            .map_err(DownloadError::Request)?;
        trace!(status = %response.status(), "Got response");

        let mut response = response.error_for_status().map_err(DownloadError::Status)?;

        let total_size = content_length(response.headers());
        if let Some(size) = total_size {
            info!(bytes = size, "Starting download");
        } else {
            info!("Starting download of unknown size");
        }

        let mut reporter = ProgressReporter::new(total_size, self.output);
        let copied = {
            let mut writer = ProgressWriter::new(&mut file, &mut reporter);
            io::copy(&mut response, &mut writer)
        };
        let written = reporter.state().total();
        let elapsed = reporter.state().elapsed_at(Instant::now());
        reporter.finish();

        if let Err(source) = copied {
            return Err(DownloadError::Stream { written, source });
        }

        check_length(total_size, written)?;

        file.sync_all().map_err(|source| DownloadError::Flush {
            path: temp_path.to_path_buf(),
            source,
        })?;
        // closed before the rename
        drop(file);

        fs::rename(temp_path, &config.destination).map_err(|source| DownloadError::Rename {
            from: temp_path.to_path_buf(),
            to: config.destination.clone(),
            source,
        })?;

        info!(bytes = written, elapsed = ?elapsed, "Download completed");

        Ok(DownloadReport {
            path: config.destination.clone(),
            bytes: written,
            content_length: total_size,
            elapsed,
        })
    }
}

/// A clean end of stream still has to match the announced size.
fn check_length(expected: Option<u64>, written: u64) -> Result<()> {
    match expected {
        Some(expected) if expected != written => Err(DownloadError::LengthMismatch {
            expected,
            actual: written,
        }),
        _ => Ok(()),
    }
}

/// Parses `Content-Length`; anything missing or malformed is an unknown size.
fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|cl| cl.to_str().ok())
        .and_then(|cl| cl.trim().parse::<u64>().ok())
}

fn discard(temp_path: &Path) {
    match fs::remove_file(temp_path) {
        Ok(()) => debug!(path = ?temp_path, "Removed partial download"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?temp_path, error = %e, "Failed to remove partial download"),
    }
}
