//! Eligibility decision and chunk planning
//!
//! Both are pure: the decider looks at the configuration and backend
//! capabilities, the planner reconciles sizes and concurrency into a
//! [`ChunkPlan`].

use crate::backend::{Fs, Object};
use crate::config::{ConcurrencyPolicy, TransferConfig};
use crate::error::{MultiCopyError, Result};
use crate::multipart::{calculate_num_chunks, WriterKind};

/// Whether a transfer of `src` to `dst` should use the multi-thread path
///
/// When this returns `false` the caller copies the object sequentially.
pub fn should_use_multi_thread(config: &TransferConfig, src: &dyn Object, dst: &dyn Fs) -> bool {
    // Not configured for more than one stream
    if config.multi_thread_streams <= 1 {
        return false;
    }
    let src_features = src.features();
    // Source can't serve parallel ranged reads
    if src_features.no_multi_threading {
        return false;
    }
    // Below the cutoff (unknown sizes never qualify)
    match src.size() {
        Some(size) if size >= config.multi_thread_cutoff => {}
        _ => return false,
    }
    // Destination has neither write path
    if WriterKind::detect(dst).is_err() {
        return false;
    }
    // Local to local gains nothing unless streams were asked for explicitly
    if !config.multi_thread_set && dst.features().is_local && src_features.is_local {
        return false;
    }
    true
}

/// Sizing of one multi-thread transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Bytes per chunk (the last one may be shorter)
    pub chunk_size: u64,
    /// Number of chunks
    pub num_chunks: usize,
    /// Chunks copied at once
    pub concurrency: usize,
}

/// Inputs to [`plan_chunks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRequest {
    /// Source size in bytes
    pub size: u64,
    /// Chunk size chosen by the destination
    pub chunk_size: u64,
    /// Operator's stream count
    pub requested_concurrency: usize,
    /// Whether the operator set the stream count explicitly
    pub explicit: bool,
    /// Destination's preferred concurrency
    pub backend_concurrency: usize,
    /// Reconciliation policy
    pub policy: ConcurrencyPolicy,
}

/// Work out chunk size, chunk count and concurrency for a transfer
pub fn plan_chunks(request: PlanRequest) -> Result<ChunkPlan> {
    if request.size == 0 {
        return Err(MultiCopyError::config("can't plan chunks for an empty object"));
    }
    if request.chunk_size == 0 {
        return Err(MultiCopyError::InvalidChunkSize(0));
    }

    let mut chunk_size = request.chunk_size;
    if chunk_size > request.size {
        tracing::debug!(
            "multi-thread copy: chunk size {} was bigger than source file size {}",
            chunk_size,
            request.size
        );
        chunk_size = request.size;
    }

    let num_chunks = calculate_num_chunks(request.size, chunk_size);

    let mut concurrency = request.requested_concurrency;
    if concurrency > num_chunks {
        tracing::debug!(
            "multi-thread copy: number of streams {} was bigger than number of chunks {}",
            concurrency,
            num_chunks
        );
        concurrency = num_chunks;
    }

    let use_backend = match request.policy {
        ConcurrencyPolicy::PreferLarger => {
            !request.explicit || request.backend_concurrency > concurrency
        }
        ConcurrencyPolicy::Operator => !request.explicit,
    };
    if use_backend {
        tracing::debug!(
            "multi-thread copy: using backend concurrency of {} instead of {}",
            request.backend_concurrency,
            concurrency
        );
        concurrency = request.backend_concurrency;
    }

    let concurrency = concurrency.clamp(1, num_chunks.max(1));

    Ok(ChunkPlan {
        chunk_size,
        num_chunks,
        concurrency,
    })
}
