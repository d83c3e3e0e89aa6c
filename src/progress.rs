//! # progress: byte counting and throttled terminal rendering
//!
//! [`ProgressMonitor`] is a transparent pass-through around any
//! [`ByteSource`]: it forwards reads, accumulates the byte count, and fires
//! a synchronous callback per non-empty read. [`ProgressDisplay`] turns that
//! count into a terminal line on stderr, either a 60-cell percentage bar
//! when the total is known or a spinner when it is not. Stdout is never
//! touched; it is reserved for the resulting links.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::source::ByteSource;

/// Counting decorator over a byte source. Does not buffer or alter bytes.
pub struct ProgressMonitor<S> {
    inner: S,
    bytes_read: Arc<AtomicU64>,
    callback: Option<Box<dyn FnMut(u64) + Send>>,
}

impl<S: ByteSource> ProgressMonitor<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            bytes_read: Arc::new(AtomicU64::new(0)),
            callback: None,
        }
    }

    /// Monitor that invokes `callback` with the updated running total after
    /// every non-empty read, before control returns to the caller.
    pub fn with_callback(inner: S, callback: impl FnMut(u64) + Send + 'static) -> Self {
        Self {
            inner,
            bytes_read: Arc::new(AtomicU64::new(0)),
            callback: Some(Box::new(callback)),
        }
    }

    /// Shared handle on the running total, usable after the monitor has been
    /// consumed by the encoder.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.bytes_read)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<S: ByteSource> ByteSource for ProgressMonitor<S> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read_chunk(buf).await?;
        if n > 0 {
            let total = self.bytes_read.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
            if let Some(callback) = &mut self.callback {
                callback(total);
            }
        }
        Ok(n)
    }

    fn known_size(&self) -> Option<u64> {
        self.inner.known_size()
    }
}

const SPIN_CHARS: [char; 4] = ['\\', '|', '/', '-'];
const BAR_WIDTH: usize = 60;
const RENDER_INTERVAL: Duration = Duration::from_millis(250);

/// Throttled stderr renderer for a monitored byte count.
///
/// Renders at most once per 250ms unless forced; each actual render clears
/// the current line first so the display updates in place.
pub struct ProgressDisplay {
    total: Option<u64>,
    spin_index: usize,
    last_render: Option<Instant>,
}

impl ProgressDisplay {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total,
            spin_index: 0,
            last_render: None,
        }
    }

    /// Render the current progress. A no-op unless this is the first call,
    /// the render interval has elapsed, or `force` is set.
    pub fn update(&mut self, bytes_read: u64, force: bool) {
        if !force {
            if let Some(last) = self.last_render {
                if last.elapsed() < RENDER_INTERVAL {
                    return;
                }
            }
        }
        self.last_render = Some(Instant::now());
        let line = self.render_line(bytes_read);
        eprint!("\r\x1b[K{line}");
        let _ = io::stderr().flush();
        self.spin_index += 1;
    }

    /// End the live-update region with a single trailing newline.
    pub fn finish(&mut self) {
        eprintln!();
    }

    fn render_line(&self, bytes_read: u64) -> String {
        match self.total {
            Some(total) => {
                let filled = if total == 0 {
                    BAR_WIDTH
                } else {
                    (bytes_read as u128 * BAR_WIDTH as u128 / total as u128) as usize
                }
                .min(BAR_WIDTH);
                let percent = if total == 0 {
                    100
                } else {
                    (bytes_read as u128 * 100 / total as u128) as u64
                };
                format!(
                    "[{}{}] {}% ({} / {})",
                    "=".repeat(filled),
                    " ".repeat(BAR_WIDTH - filled),
                    percent,
                    human_size(bytes_read),
                    human_size(total),
                )
            }
            None => {
                let spin = SPIN_CHARS[self.spin_index % SPIN_CHARS.len()];
                format!("{} ({})", spin, human_size(bytes_read))
            }
        }
    }
}

/// Human-readable byte count: `0 bytes`, `1023 bytes`, `1 KB`, `1 MB`, ...
/// Divides by 1024 until the value fits the current unit.
pub fn human_size(n_bytes: u64) -> String {
    const UNITS: [&str; 7] = ["bytes", "KB", "MB", "GB", "TB", "PB", "EB"];
    let mut value = n_bytes;
    let mut unit = 0;
    while value >= 1024 && unit < UNITS.len() - 1 {
        value >>= 10;
        unit += 1;
    }
    format!("{} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::sync::Mutex;

    #[tokio::test]
    async fn monitor_counts_every_byte_and_fires_per_nonempty_read() {
        let payload: Vec<u8> = (0..100).collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut monitor = ProgressMonitor::with_callback(
            MemorySource::new(payload.clone()),
            move |total| sink.lock().expect("callback sink").push(total),
        );
        assert_eq!(monitor.known_size(), Some(100));

        let counter = monitor.counter();
        let mut buf = [0u8; 7];
        let mut drained = Vec::new();
        loop {
            let n = monitor.read_chunk(&mut buf).await.expect("read failed");
            if n == 0 {
                break;
            }
            drained.extend_from_slice(&buf[..n]);
        }

        assert_eq!(drained, payload);
        assert_eq!(monitor.bytes_read(), 100);
        assert_eq!(counter.load(Ordering::Relaxed), 100);

        let seen = seen.lock().expect("callback sink");
        // One callback per non-empty read (15 reads of <=7 bytes), totals
        // strictly increasing up to the source length.
        assert_eq!(seen.len(), 15);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*seen.last().expect("at least one read"), 100);
    }

    #[test]
    fn human_size_fixed_points() {
        assert_eq!(human_size(0), "0 bytes");
        assert_eq!(human_size(1023), "1023 bytes");
        assert_eq!(human_size(1024), "1 KB");
        assert_eq!(human_size(1048576), "1 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3 GB");
    }

    #[test]
    fn determinate_bar_bounds() {
        let display = ProgressDisplay::new(Some(2048));

        let empty = display.render_line(0);
        assert!(empty.contains(" 0% "), "line: {empty}");
        assert_eq!(empty.matches('=').count(), 0);

        let full = display.render_line(2048);
        assert!(full.contains(" 100% "), "line: {full}");
        assert_eq!(full.matches('=').count(), BAR_WIDTH);
        assert!(full.contains("(2 KB / 2 KB)"));
    }

    #[test]
    fn indeterminate_line_rotates_spinner_per_render() {
        let mut display = ProgressDisplay::new(None);
        assert!(display.render_line(5000).starts_with('\\'));
        display.update(5000, true);
        assert!(display.render_line(5000).starts_with('|'));
        display.update(5000, true);
        assert!(display.render_line(5000).starts_with('/'));
    }

    #[test]
    fn updates_are_throttled_between_renders() {
        let mut display = ProgressDisplay::new(None);
        display.update(1, false);
        let spins_after_first = display.spin_index;
        // Immediately after a render, unforced updates are dropped.
        display.update(2, false);
        assert_eq!(display.spin_index, spins_after_first);
        // A forced update always renders.
        display.update(3, true);
        assert_eq!(display.spin_index, spins_after_first + 1);
    }
}
