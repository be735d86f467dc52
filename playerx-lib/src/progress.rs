//! Download progress bookkeeping and the surfaces that display it.
//!
//! [`DownloadState`] is fed one event per received chunk and decides, at a
//! fixed cadence, when a new [`ProgressSnapshot`] is worth showing. Transfer
//! speed comes from a small ring buffer of `(elapsed, bytes)` samples, so the
//! maths can be exercised without any I/O.

use crate::logging::{progress_bar_style, spinner_style};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Minimum time between two emitted snapshots.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

const RATE_WINDOW_LEN: usize = 8;
const BAR_LENGTH: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// `None` when the total size is unknown.
    pub fraction: Option<f64>,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSample {
    pub elapsed: Duration,
    pub bytes: u64,
}

/// Fixed-size ring buffer of recent samples.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    samples: VecDeque<RateSample>,
}

impl RateWindow {
    pub fn push(&mut self, sample: RateSample) {
        if self.samples.len() == RATE_WINDOW_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Bytes per second across the window.
    pub fn rate(&self) -> Option<f64> {
        let (first, last) = (self.samples.front()?, self.samples.back()?);
        bytes_per_second(first, last)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Average transfer rate between two samples.
pub fn bytes_per_second(from: &RateSample, to: &RateSample) -> Option<f64> {
    let seconds = to.elapsed.checked_sub(from.elapsed)?.as_secs_f64();
    if seconds <= 0.0 || to.bytes < from.bytes {
        return None;
    }
    Some((to.bytes - from.bytes) as f64 / seconds)
}

/// Time left to transfer `remaining` bytes at `rate` bytes per second.
pub fn estimate_remaining(remaining: u64, rate: f64) -> Option<Duration> {
    if rate <= 0.0 || !rate.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / rate))
}

/// Per-attempt download bookkeeping.
#[derive(Debug)]
pub struct DownloadState {
    total_bytes: Option<u64>,
    received_bytes: u64,
    started_at: Instant,
    last_sample_at: Option<Duration>,
    last_sample_bytes: u64,
    window: RateWindow,
}

impl DownloadState {
    pub fn new(total_bytes: Option<u64>, started_at: Instant) -> Self {
        let mut window = RateWindow::default();
        window.push(RateSample {
            elapsed: Duration::ZERO,
            bytes: 0,
        });
        Self {
            total_bytes: total_bytes.filter(|total| *total > 0),
            received_bytes: 0,
            started_at,
            last_sample_at: None,
            last_sample_bytes: 0,
            window,
        }
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// Records a received chunk and returns a snapshot if the sample interval
    /// has elapsed since the previous one.
    pub fn record(&mut self, chunk_len: u64, now: Instant) -> Option<ProgressSnapshot> {
        self.received_bytes += chunk_len;
        let elapsed = now.saturating_duration_since(self.started_at);

        if let Some(last) = self.last_sample_at
            && elapsed.saturating_sub(last) < SAMPLE_INTERVAL
        {
            return None;
        }

        self.last_sample_at = Some(elapsed);
        self.last_sample_bytes = self.received_bytes;
        self.window.push(RateSample {
            elapsed,
            bytes: self.received_bytes,
        });
        Some(self.snapshot())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let received = format_bytes(self.received_bytes);
        let Some(total) = self.total_bytes else {
            return ProgressSnapshot {
                fraction: None,
                status: format!("{received} downloaded (total size unknown)"),
            };
        };

        let fraction = (self.received_bytes as f64 / total as f64).clamp(0.0, 1.0);
        let mut status = format!(
            "{received} / {} ({:.0}%)",
            format_bytes(total),
            fraction * 100.0
        );
        if let Some(rate) = self.window.rate() {
            status.push_str(&format!(" - {}/s", format_bytes(rate as u64)));
            let remaining = total.saturating_sub(self.last_sample_bytes);
            if let Some(eta) = estimate_remaining(remaining, rate) {
                status.push_str(&format!(" - {} left", format_duration(eta)));
            }
        }
        ProgressSnapshot {
            fraction: Some(fraction),
            status,
        }
    }

    pub fn completed(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            fraction: Some(1.0),
            status: format!("Download complete ({})", format_bytes(self.received_bytes)),
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0..60 => format!("{secs}s"),
        60..3600 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

/// A surface that shows download progress. Opened once per download attempt.
pub trait ProgressReporter: Send + Sync {
    fn open(&self, title: &str);
    fn update(&self, snapshot: &ProgressSnapshot);
    fn close(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn open(&self, _title: &str) {}
    fn update(&self, _snapshot: &ProgressSnapshot) {}
    fn close(&self) {}
}

/// Progress bar rendered by the `tracing-indicatif` layer.
#[derive(Debug, Default)]
pub struct SpanProgress {
    span: Mutex<Option<tracing::Span>>,
}

impl SpanProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for SpanProgress {
    fn open(&self, title: &str) {
        let span = tracing::info_span!("download");
        if let Ok(style) = progress_bar_style() {
            span.pb_set_style(&style);
        }
        span.pb_set_length(BAR_LENGTH);
        span.pb_set_message(title);
        span.pb_set_finish_message(&format!("{title} Done"));
        // The bar is attached the first time the span is entered.
        span.in_scope(|| {});
        if let Ok(mut slot) = self.span.lock() {
            *slot = Some(span);
        }
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        let Ok(slot) = self.span.lock() else {
            return;
        };
        let Some(span) = slot.as_ref() else {
            return;
        };
        match snapshot.fraction {
            Some(fraction) => {
                span.pb_set_position((fraction * BAR_LENGTH as f64) as u64);
            }
            None => {
                if let Ok(style) = spinner_style("{msg}") {
                    span.pb_set_style(&style);
                }
            }
        }
        span.pb_set_message(&snapshot.status);
    }

    fn close(&self) {
        if let Ok(mut slot) = self.span.lock() {
            slot.take();
        }
    }
}
