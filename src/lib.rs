//! # MultiCopy - Parallel Chunked Object Transfers
//!
//! MultiCopy copies one large object between storage backends by splitting
//! it into byte-range chunks and moving them in parallel, then committing a
//! single destination object. A transfer either completes as a whole or
//! cleans up after itself.
//!
//! ## Features
//!
//! - **Two write paths**: backend-native multipart uploads, or random-access
//!   writes adapted to chunks by offset
//! - **Bounded parallelism**: a fixed number of chunks in flight, stopping at
//!   the first failure
//! - **Abort protocol**: partial data is removed on failure unless the
//!   backend wants to keep it
//! - **Accounting**: shared byte counters, optional bandwidth limit and
//!   progress bars
//! - **Backends**: local filesystem and in-memory store
//!
//! ## Quick Start
//!
//! ```no_run
//! use multicopy::prelude::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> multicopy::Result<()> {
//! let src_fs = LocalFs::new("/data");
//! let dst: Arc<dyn Fs> = Arc::new(LocalFs::new("/backup"));
//! let src = src_fs.new_object("large.bin").await?;
//!
//! let config = TransferConfig::default().with_streams(8);
//! if should_use_multi_thread(&config, src.as_ref(), dst.as_ref()) {
//!     let account = Arc::new(Account::new(src.remote()));
//!     let copied = multi_thread_copy(
//!         &dst,
//!         "large.bin",
//!         &src,
//!         &config,
//!         account,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!     println!("copied {:?} bytes", copied.size());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accounting;
pub mod backend;
pub mod config;
pub mod error;
pub mod multipart;
pub mod progress;

// Re-export commonly used types
pub use config::TransferConfig;
pub use error::{MultiCopyError, Result};
pub use multipart::{multi_thread_copy, should_use_multi_thread};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use multicopy::prelude::*;
    //! ```

    pub use crate::accounting::{Account, BandwidthLimiter};
    pub use crate::backend::{Features, Fs, LocalFs, MemoryFs, MemoryOptions, Object, RangeOption};
    pub use crate::config::{ConcurrencyPolicy, TransferConfig};
    pub use crate::error::{MultiCopyError, Result};
    pub use crate::multipart::{
        multi_thread_copy, plan_chunks, should_use_multi_thread, ChunkPlan, ChunkWriter,
        ChunkWriterInfo, PlanRequest, WriterKind,
    };
    pub use crate::progress::ProgressReporter;
}
