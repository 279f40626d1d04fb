//! Progress reporting for a single transfer
//!
//! Bytes are counted on their way to disk by [`ProgressWriter`], a thin
//! [`Write`] decorator that hands every accepted chunk length to an
//! [`Observer`]. [`ProgressReporter`] is the observer used by the binary: it
//! keeps the running [`TransferState`] and renders one status line on stderr.

use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::{
    io::{self, Write},
    sync::LazyLock,
    time::{Duration, Instant},
};
use tracing::trace;

const BAR_STYLE: &str = "{msg} [{elapsed_precise}] {bar:15.cyan/blue} {bytes}/{total_bytes}";

const SPINNER_STYLE: &str = "{spinner:.blue} {msg} [{elapsed_precise}] {bytes}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const BAR_CHARS: &str = "█▓▒░  ";

static BAR_TEMPLATE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template(BAR_STYLE)
        .ok()
        .map(|style| style.progress_chars(BAR_CHARS))
});

static SPINNER_TEMPLATE: LazyLock<Option<ProgressStyle>> = LazyLock::new(|| {
    ProgressStyle::with_template(SPINNER_STYLE)
        .ok()
        .map(|style| style.tick_chars(TICK))
});

/// Receives the length of every chunk that made it to the sink.
pub trait Observer {
    fn observe(&mut self, bytes: u64);
}

impl<O: Observer + ?Sized> Observer for &mut O {
    fn observe(&mut self, bytes: u64) {
        (**self).observe(bytes);
    }
}

/// Writer that forwards bytes unchanged and reports how many were accepted.
pub struct ProgressWriter<W, O> {
    inner: W,
    observer: O,
}

impl<W: Write, O: Observer> ProgressWriter<W, O> {
    pub fn new(inner: W, observer: O) -> Self {
        Self { inner, observer }
    }

    #[cfg(test)]
    fn into_parts(self) -> (W, O) {
        (self.inner, self.observer)
    }
}

impl<W: Write, O: Observer> Write for ProgressWriter<W, O> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        // only what the sink accepted, a short write is retried by the caller
        self.observer.observe(written as u64);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Where the status line goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProgressOutput {
    #[default]
    Stderr,
    Hidden,
}

impl ProgressOutput {
    fn draw_target(self) -> ProgressDrawTarget {
        match self {
            Self::Stderr => ProgressDrawTarget::stderr(),
            Self::Hidden => ProgressDrawTarget::hidden(),
        }
    }
}

/// Running counters for one transfer.
///
/// The byte count only ever grows.
#[derive(Debug, Clone)]
pub struct TransferState {
    total: u64,
    last_reported: u64,
    started: Instant,
}

impl TransferState {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            total: 0,
            last_reported: 0,
            started,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.total = self.total.saturating_add(bytes);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Bytes observed since the previous call; resets the counter.
    pub fn take_since_last_report(&mut self) -> u64 {
        let delta = self.total - self.last_reported;
        self.last_reported = self.total;
        delta
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Average throughput from the start of the transfer up to `now`.
    pub fn rate_at(&self, now: Instant) -> f64 {
        bytes_per_second(self.total, self.elapsed_at(now))
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}

pub fn human_bytes(bytes: u64) -> String {
    ByteSize::b(bytes).display().si().to_string()
}

/// Status line text, e.g. `Downloading... 3.2 MB complete | Speed: 512.0 kB/s`
pub fn describe(total: u64, rate: f64) -> String {
    format!(
        "Downloading... {} complete | Speed: {}/s",
        human_bytes(total),
        human_bytes(rate as u64)
    )
}

pub struct ProgressReporter {
    bar: ProgressBar,
    state: TransferState,
}

impl ProgressReporter {
    /// `total` sizes the bar; `None` switches to a spinner with a plain count.
    pub fn new(total: Option<u64>, output: ProgressOutput) -> Self {
        let bar = ProgressBar::with_draw_target(total, output.draw_target());
        let template: &Option<ProgressStyle> = if total.is_some() {
            &BAR_TEMPLATE
        } else {
            &SPINNER_TEMPLATE
        };
        let bar = match template.as_ref() {
            Some(style) => bar.with_style(style.clone()),
            None => bar,
        };
        bar.set_message("Downloading...");

        Self {
            bar,
            state: TransferState::new(),
        }
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn render(&mut self) {
        let now = Instant::now();
        let delta = self.state.take_since_last_report();
        let rate = self.state.rate_at(now);
        trace!(
            total = self.state.total(),
            delta,
            rate = rate as u64,
            "Rendering progress"
        );
        self.bar.set_message(describe(self.state.total(), rate));
    }

    /// Replaces the live bar with the final status line.
    pub fn finish(&self) {
        let line = describe(self.state.total(), self.state.rate_at(Instant::now()));
        let visible = !self.bar.is_hidden();
        self.bar.finish_and_clear();
        if visible {
            // rendering is best effort, a closed stderr must not fail the download
            let _ = writeln!(io::stderr(), "{line}");
        }
    }
}

impl Observer for ProgressReporter {
    fn observe(&mut self, bytes: u64) {
        self.state.record(bytes);
        self.bar.inc(bytes);
        self.render();
    }
}
