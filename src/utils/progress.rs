//! Progress reporting for downloads.
//!
//! Thin wrapper over [`indicatif`] with binswap styling. Bars are hidden when
//! progress output is disabled (`--no-progress` / `BINSWAP_NO_PROGRESS`) or when
//! stderr is not a terminal, so redirected logs never fill up with redraws.
//! Redraws are additionally capped at 10 per second by the draw target, and
//! [`RateLimiter`] lets callers gate their own per-chunk bookkeeping the same way.

use indicatif::{
    ProgressBar as IndicatifBar, ProgressDrawTarget, ProgressStyle as IndicatifStyle,
};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

use crate::constants::NO_PROGRESS_ENV;

/// Whether progress bars should be suppressed.
pub fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some() || !std::io::stderr().is_terminal()
}

/// A progress indicator for a single transfer.
///
/// With a known length it renders a byte bar; otherwise a spinner with a byte
/// counter. When progress is disabled all calls are no-ops.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Create a download indicator for `len` bytes (or an unknown length).
    pub fn new_download(len: Option<u64>) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }

        let target = ProgressDrawTarget::stderr_with_hz(10);
        let bar = IndicatifBar::with_draw_target(len, target);
        match len {
            Some(_) => bar.set_style(ProgressStyle::download()),
            None => {
                bar.set_style(ProgressStyle::spinner());
                bar.enable_steady_tick(Duration::from_millis(100));
            }
        }
        Self {
            inner: bar,
        }
    }

    /// A progress bar that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    /// Whether this bar draws anything.
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    /// Set the label shown before the bar.
    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    /// Set the message shown after the bar.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Set the number of bytes received so far.
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Finish and leave a final message on screen.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finish and erase the bar.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Styles used by binswap progress output.
pub struct ProgressStyle;

impl ProgressStyle {
    /// Byte bar for downloads with a declared length.
    ///
    /// ```text
    /// scraper_v12 [━━━━━━━━━━━━━━━━━━━━━━╸━━━━━━━━━━━━━━━━━] 2.1 MiB/4.0 MiB (00:05)
    /// ```
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .progress_chars("━╸━")
    }

    /// Spinner with a byte counter for downloads of unknown length.
    pub fn spinner() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.cyan} {bytes} {msg}")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }
}

/// Lets an event through at most once per interval.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing one event per `min_interval`.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Returns `true` if an event may be emitted now, and records it.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// Same as [`ready`](Self::ready) with an explicit clock reading.
    pub fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
