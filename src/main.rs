use streamdl::{DownloadConfig, Downloader};
use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    // stderr is shared with the progress line, stay quiet unless RUST_LOG asks otherwise
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    color_eyre::install()?;

    let config = DownloadConfig::default();

    println!("Download Started");

    let report = Downloader::new()?.download(&config)?;
    tracing::debug!(
        path = ?report.path,
        bytes = report.bytes,
        content_length = ?report.content_length,
        bytes_per_sec = report.bytes_per_second() as u64,
        "Saved download"
    );

    println!("Download Finished");

    Ok(())
}
