//! Streams a single file over HTTP to disk with a live progress line.
//!
//! The body goes to `<destination>.tmp` first and is renamed onto the
//! destination only once the transfer is complete.

pub mod config;
pub mod error;
pub mod progress;
pub mod transfer;

#[cfg(test)]
mod test_server;

pub use config::DownloadConfig;
pub use error::DownloadError;
pub use progress::{Observer, ProgressOutput, ProgressReporter, ProgressWriter, TransferState};
pub use transfer::{DownloadReport, Downloader};
