//! Bandwidth throttling for controlled transfer rates
//!
//! Implements rate limiting using the Governor crate for smooth,
//! token-bucket based bandwidth control. One limiter is shared by every
//! chunk of a transfer, so the limit applies to the transfer as a whole.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Use 1KB chunks as tokens for smoother throttling
const BYTES_PER_TOKEN: usize = 1024;

/// Bandwidth limiter for controlling transfer rates
pub struct BandwidthLimiter {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    bytes_per_second: u64,
}

impl BandwidthLimiter {
    /// Create a new bandwidth limiter
    ///
    /// # Arguments
    /// * `bytes_per_second` - Maximum transfer rate in bytes per second
    ///
    /// # Example
    /// ```
    /// use multicopy::accounting::BandwidthLimiter;
    /// let limiter = BandwidthLimiter::new(100 * 1024 * 1024); // 100 MB/s
    /// assert_eq!(limiter.bytes_per_second(), 100 * 1024 * 1024);
    /// ```
    pub fn new(bytes_per_second: u64) -> Self {
        let tokens_per_second = (bytes_per_second as usize / BYTES_PER_TOKEN).max(1);

        // Cap at u32::MAX to prevent overflow when casting
        let capped_tokens = tokens_per_second.min(u32::MAX as usize) as u32;
        let per_second = NonZeroU32::new(capped_tokens).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(per_second);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            bytes_per_second,
        }
    }

    /// Configured rate in bytes per second
    pub fn bytes_per_second(&self) -> u64 {
        self.bytes_per_second
    }

    /// Wait until we're allowed to transfer the given number of bytes
    pub async fn wait_for_capacity(&self, bytes: usize) {
        for _ in 0..tokens_for(bytes) {
            self.limiter.until_ready().await;
        }
    }

    /// Take capacity for `bytes` if it is free right now
    ///
    /// Either all of the tokens are taken or none are.
    pub fn try_acquire(&self, bytes: usize) -> bool {
        let tokens = NonZeroU32::new(tokens_for(bytes)).unwrap_or(NonZeroU32::MIN);
        matches!(self.limiter.check_n(tokens), Ok(Ok(())))
    }
}

fn tokens_for(bytes: usize) -> u32 {
    (bytes / BYTES_PER_TOKEN).clamp(1, u32::MAX as usize) as u32
}

impl Clone for BandwidthLimiter {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            bytes_per_second: self.bytes_per_second,
        }
    }
}

impl std::fmt::Debug for BandwidthLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthLimiter")
            .field("bytes_per_second", &self.bytes_per_second)
            .finish()
    }
}
