//! Per-transfer byte accounting
//!
//! An [`Account`] is shared by every chunk of one transfer. Bytes are
//! counted as the destination consumes them through an [`AccountedReader`],
//! which is also where the optional bandwidth limit is applied.

use super::BandwidthLimiter;
use crate::progress::ProgressReporter;
use futures::future::{BoxFuture, FutureExt};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

/// Transfer statistics for one object
pub struct Account {
    name: String,
    bytes: AtomicU64,
    chunks: AtomicU64,
    progress: Option<Arc<ProgressReporter>>,
    limiter: Option<BandwidthLimiter>,
}

impl Account {
    /// Create an account for the object called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes: AtomicU64::new(0),
            chunks: AtomicU64::new(0),
            progress: None,
            limiter: None,
        }
    }

    /// Report into a progress display
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Limit the read rate of this transfer
    pub fn with_bandwidth_limit(mut self, bytes_per_second: u64) -> Self {
        self.limiter = Some(BandwidthLimiter::new(bytes_per_second));
        self
    }

    /// Bytes counted so far
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Chunks finished so far
    pub fn chunks_done(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// Announce the size of the transfer; `chunks` is 0 for a sequential copy
    pub fn set_total(&self, bytes: u64, chunks: usize) {
        if let Some(progress) = &self.progress {
            progress.begin(&self.name, bytes, chunks as u64);
        }
    }

    /// Count `n` transferred bytes
    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
        if let Some(progress) = &self.progress {
            progress.add_bytes(n);
        }
    }

    /// Mark a chunk as in flight until the returned handle is finished or dropped
    pub fn begin_chunk(&self) -> ChunkInFlight<'_> {
        if let Some(progress) = &self.progress {
            progress.chunk_started();
        }
        ChunkInFlight {
            account: self,
            finished: false,
        }
    }

    /// Bandwidth limiter, if one is set
    pub fn limiter(&self) -> Option<&BandwidthLimiter> {
        self.limiter.as_ref()
    }

    /// Wrap `reader` so that bytes read through it are counted here
    pub fn wrap<R>(self: &Arc<Self>, reader: R) -> AccountedReader<R> {
        AccountedReader {
            inner: reader,
            account: Arc::clone(self),
            throttle: None,
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("bytes", &self.bytes())
            .field("chunks", &self.chunks_done())
            .field("limiter", &self.limiter)
            .finish()
    }
}

/// A chunk being copied
///
/// Dropping it without calling [`finish`](Self::finish) takes the chunk out
/// of flight without counting it, which covers failed and cancelled chunks.
pub struct ChunkInFlight<'a> {
    account: &'a Account,
    finished: bool,
}

impl ChunkInFlight<'_> {
    /// Count the chunk as done
    pub fn finish(mut self) {
        self.finished = true;
        self.account.chunks.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for ChunkInFlight<'_> {
    fn drop(&mut self) {
        if let Some(progress) = &self.account.progress {
            progress.chunk_stopped(self.finished);
        }
    }
}

/// Reader that counts bytes into an [`Account`] and applies its rate limit
pub struct AccountedReader<R> {
    inner: R,
    account: Arc<Account>,
    throttle: Option<BoxFuture<'static, ()>>,
}

impl<R> AccountedReader<R> {
    /// The wrapped reader, mutably
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for AccountedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // Pay for the previous read before issuing the next one
        if let Some(wait) = this.throttle.as_mut() {
            ready!(wait.poll_unpin(cx));
            this.throttle = None;
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let n = buf.filled().len() - before;

        if n > 0 {
            this.account.add_bytes(n as u64);
            if let Some(limiter) = this.account.limiter() {
                if !limiter.try_acquire(n) {
                    let limiter = limiter.clone();
                    this.throttle = Some(Box::pin(async move { limiter.wait_for_capacity(n).await }));
                }
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<R: AsyncSeek + Unpin> AsyncSeek for AccountedReader<R> {
    fn start_seek(self: Pin<&mut Self>, position: io::SeekFrom) -> io::Result<()> {
        Pin::new(&mut self.get_mut().inner).start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.get_mut().inner).poll_complete(cx)
    }
}
