//! Terminal display for one chunked transfer
//!
//! Two lines share a [`MultiProgress`]: a spinner line naming the object
//! with chunk counts (finished, total and in flight), and a byte bar with
//! rate and ETA underneath it.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(120);

/// Chunk counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkCounts {
    /// Chunks planned for the transfer, 0 for a sequential copy
    pub total: u64,
    /// Chunks currently being copied
    pub active: u64,
    /// Chunks written successfully
    pub done: u64,
}

impl ChunkCounts {
    fn describe(&self) -> String {
        if self.total == 0 {
            return "sequential copy".to_string();
        }
        format!("{}/{} chunks, {} in flight", self.done, self.total, self.active)
    }
}

/// Progress display fed by an [`Account`](crate::accounting::Account)
pub struct ProgressReporter {
    chunks: ProgressBar,
    bytes: ProgressBar,
    total: AtomicU64,
    active: AtomicU64,
    done: AtomicU64,
}

impl ProgressReporter {
    /// Draw to stderr
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr(), true)
    }

    /// Track counts without drawing anything (quiet mode)
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden(), false)
    }

    fn with_target(target: ProgressDrawTarget, tick: bool) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let chunks = multi.add(ProgressBar::new_spinner());
        chunks.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        if tick {
            chunks.enable_steady_tick(TICK);
        }

        let bytes = multi.add(ProgressBar::new(0));
        bytes.set_style(
            ProgressStyle::with_template(
                "  [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );

        Self {
            chunks,
            bytes,
            total: AtomicU64::new(0),
            active: AtomicU64::new(0),
            done: AtomicU64::new(0),
        }
    }

    /// Start displaying a transfer of `bytes` split into `chunks`
    pub fn begin(&self, name: &str, bytes: u64, chunks: u64) {
        self.total.store(chunks, Ordering::Relaxed);
        self.chunks.set_prefix(name.to_string());
        self.bytes.set_length(bytes);
        self.refresh();
    }

    /// Advance the byte bar
    pub fn add_bytes(&self, n: u64) {
        self.bytes.inc(n);
    }

    /// A chunk went in flight
    pub fn chunk_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.refresh();
    }

    /// A chunk left flight, successfully or not
    pub fn chunk_stopped(&self, succeeded: bool) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        if succeeded {
            self.done.fetch_add(1, Ordering::Relaxed);
        }
        self.refresh();
    }

    /// Current chunk counters
    pub fn counts(&self) -> ChunkCounts {
        ChunkCounts {
            total: self.total.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
        }
    }

    /// Stop the display after a successful transfer
    pub fn finish(&self, message: &str) {
        self.chunks
            .finish_with_message(format!("✓ {} ({})", message, self.counts().describe()));
        self.bytes.finish();
    }

    /// Stop the display after a failed transfer, leaving the bars where they were
    pub fn abandon(&self, message: &str) {
        self.chunks.abandon_with_message(format!("✗ {}", message));
        self.bytes.abandon();
    }

    fn refresh(&self) {
        self.chunks.set_message(self.counts().describe());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
