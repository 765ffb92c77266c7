//! Multi-thread transfer coordinator
//!
//! Runs one chunked transfer end to end:
//!
//! 1. Pick the write path and validate the source size
//! 2. Open the chunk writer and plan the chunks
//! 3. Copy chunks on a bounded set of tasks, stopping at the first failure
//! 4. Close the writer, resolve the new object and propagate its mod time
//!
//! Exactly one of `close` or `abort` runs for every opened writer. A failed
//! transfer aborts unless the writer asked to keep its parts, and abort
//! errors are logged without replacing the error that caused them.

use crate::accounting::Account;
use crate::backend::{Fs, Object};
use crate::config::TransferConfig;
use crate::error::{MultiCopyError, Result};
use crate::multipart::{
    plan_chunks, ChunkCopier, ChunkPlan, ChunkWriter, PlanRequest, SessionWriter, WriterKind,
};
use humansize::{format_size, BINARY};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Copy `src` to `remote` on `dst` as parallel chunks
///
/// Cancelling `cancel` stops the transfer, aborts the writer and returns
/// [`MultiCopyError::Cancelled`]. Callers should consult
/// [`should_use_multi_thread`](crate::multipart::should_use_multi_thread)
/// first and fall back to a sequential copy when it says no.
pub async fn multi_thread_copy(
    dst: &Arc<dyn Fs>,
    remote: &str,
    src: &Arc<dyn Object>,
    config: &TransferConfig,
    account: Arc<Account>,
    cancel: &CancellationToken,
) -> Result<Arc<dyn Object>> {
    let kind = WriterKind::detect(dst.as_ref())?;

    let size = match src.size() {
        None => return Err(MultiCopyError::UnknownSize(src.remote().to_string())),
        Some(0) => return Err(MultiCopyError::ZeroSize(src.remote().to_string())),
        Some(size) => size,
    };

    let (info, writer) = SessionWriter::open(kind, dst, remote, src.as_ref(), config)
        .await
        .map_err(|e| MultiCopyError::OpenChunkWriter(Box::new(e)))?;
    let writer = Arc::new(writer);
    let guard = AbortGuard::new(Arc::clone(&writer), info.leave_parts_on_error, src.remote());

    let plan = match plan_chunks(PlanRequest {
        size,
        chunk_size: info.chunk_size,
        requested_concurrency: config.multi_thread_streams,
        explicit: config.multi_thread_set,
        backend_concurrency: info.concurrency,
        policy: config.concurrency_policy,
    }) {
        Ok(plan) => plan,
        Err(e) => {
            guard.abort().await;
            return Err(e);
        }
    };

    account.set_total(size, plan.num_chunks);
    tracing::info!(
        "{}: Starting multi-thread copy with {} chunks of size {} with {} parallel streams",
        src.remote(),
        plan.num_chunks,
        format_size(plan.chunk_size, BINARY),
        plan.concurrency
    );

    let copier = Arc::new(ChunkCopier::new(
        Arc::clone(src),
        size,
        plan.chunk_size,
        plan.num_chunks,
        !writer.needs_seekable_input(),
        config.chunk_memory_limit,
        account,
    ));

    if let Err(e) = run_chunks(copier, Arc::clone(&writer), plan, cancel).await {
        guard.abort().await;
        return Err(e);
    }

    if let Err(e) = writer.close().await {
        guard.abort().await;
        return Err(MultiCopyError::CloseFailed(Box::new(e)));
    }
    guard.disarm();

    let obj = finalize(dst, remote, src).await?;

    tracing::info!(
        "{}: Finished multi-thread copy with {} parts of size {}",
        src.remote(),
        plan.num_chunks,
        format_size(plan.chunk_size, BINARY)
    );
    Ok(obj)
}

/// Copy every chunk with at most `plan.concurrency` in flight
///
/// Returns the first error any chunk produced. All spawned tasks have
/// finished by the time this returns.
async fn run_chunks(
    copier: Arc<ChunkCopier>,
    writer: Arc<SessionWriter>,
    plan: ChunkPlan,
    cancel: &CancellationToken,
) -> Result<()> {
    let token = cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(plan.concurrency));
    let first_error: Arc<Mutex<Option<MultiCopyError>>> = Arc::new(Mutex::new(None));
    let mut tasks = JoinSet::new();

    for index in 0..plan.num_chunks {
        // Fail fast, don't start chunks that will be thrown away
        if token.is_cancelled() {
            break;
        }
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    record_error(&first_error, MultiCopyError::TaskError(e.to_string()));
                    token.cancel();
                    break;
                }
            },
        };

        let copier = Arc::clone(&copier);
        let writer = Arc::clone(&writer);
        let token = token.clone();
        let first_error = Arc::clone(&first_error);
        tasks.spawn(async move {
            let _permit = permit;
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(MultiCopyError::Cancelled),
                result = copier.copy_chunk(index, writer.as_ref()) => result,
            };
            if let Err(e) = result {
                record_error(&first_error, e);
                token.cancel();
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            record_error(&first_error, MultiCopyError::TaskError(e.to_string()));
            token.cancel();
        }
    }

    let recorded = first_error.lock().ok().and_then(|mut slot| slot.take());
    match recorded {
        Some(e) => Err(e),
        None if token.is_cancelled() => Err(MultiCopyError::Cancelled),
        None => Ok(()),
    }
}

/// Keep the first error; later ones are usually fallout from cancelling
fn record_error(slot: &Mutex<Option<MultiCopyError>>, err: MultiCopyError) {
    if let Ok(mut slot) = slot.lock() {
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

/// Resolve the committed object and carry over the modification time
async fn finalize(dst: &Arc<dyn Fs>, remote: &str, src: &Arc<dyn Object>) -> Result<Arc<dyn Object>> {
    let obj = dst
        .new_object(remote)
        .await
        .map_err(|e| MultiCopyError::ObjectNotFoundAfterCopy {
            remote: remote.to_string(),
            source: Box::new(e),
        })?;

    if dst.features().partial_uploads {
        match obj.set_mod_time(src.mod_time().await).await {
            Ok(()) => {}
            Err(e) if e.is_mod_time_unsupported() => {
                tracing::debug!("{}: can't set modification time: {}", remote, e);
            }
            Err(e) => return Err(MultiCopyError::SetModTime(Box::new(e))),
        }
    }
    Ok(obj)
}

/// Aborts the writer unless disarmed
///
/// Dropping an armed guard (the transfer future was dropped, or a panic
/// unwound through it) spawns the abort on the current runtime.
struct AbortGuard {
    writer: Option<Arc<SessionWriter>>,
    leave_parts: bool,
    name: String,
}

impl AbortGuard {
    fn new(writer: Arc<SessionWriter>, leave_parts: bool, name: &str) -> Self {
        Self {
            writer: Some(writer),
            leave_parts,
            name: name.to_string(),
        }
    }

    /// The writer was closed; nothing to clean up
    fn disarm(mut self) {
        self.writer = None;
    }

    /// Abort now, logging any failure
    async fn abort(mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        if self.leave_parts {
            tracing::debug!("{}: multi-thread copy: leaving parts on error", self.name);
            return;
        }
        tracing::debug!("{}: multi-thread copy: cancelling transfer on exit", self.name);
        if let Err(e) = writer.abort().await {
            tracing::warn!("{}: multi-thread copy: abort failed: {}", self.name, e);
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        if self.leave_parts {
            return;
        }
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("{}: multi-thread copy: transfer dropped, aborting", name);
                handle.spawn(async move {
                    if let Err(e) = writer.abort().await {
                        tracing::warn!("{}: multi-thread copy: abort failed: {}", name, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("{}: multi-thread copy: no runtime to abort dropped transfer", name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Features, MemoryFs, MemoryObject, MemoryOptions};
    use tokio::io::AsyncReadExt;

    fn payload(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 253) as u8).collect()
    }

    fn source(data: Vec<u8>) -> Arc<dyn Object> {
        Arc::new(MemoryObject::detached("src", data, Features::default()))
    }

    async fn read_all(obj: &Arc<dyn Object>) -> Vec<u8> {
        let mut data = Vec::new();
        obj.open(None).await.unwrap().read_to_end(&mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn test_copy_through_native_writer() {
        let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new(
            "mem",
            MemoryOptions::default().with_chunk_size(100).with_concurrency(3),
        ));
        let data = payload(1000);
        let account = Arc::new(Account::new("src"));

        let obj = multi_thread_copy(
            &dst,
            "dst",
            &source(data.clone()),
            &TransferConfig::default(),
            Arc::clone(&account),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(obj.size(), Some(1000));
        assert_eq!(read_all(&obj).await, data);
        assert_eq!(account.bytes(), 1000);
        assert_eq!(account.chunks_done(), 10);
    }

    #[tokio::test]
    async fn test_copy_through_writer_at() {
        let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new(
            "mem",
            MemoryOptions::default().with_chunk_writer(false).with_writer_at(true),
        ));
        let data = payload(1000);
        let config = TransferConfig {
            multi_thread_chunk_size: 300,
            ..Default::default()
        };

        let obj = multi_thread_copy(
            &dst,
            "dst",
            &source(data.clone()),
            &config,
            Arc::new(Account::new("src")),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(read_all(&obj).await, data);
    }

    #[tokio::test]
    async fn test_rejects_zero_size_source() {
        let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new("mem", MemoryOptions::default()));
        let result = multi_thread_copy(
            &dst,
            "dst",
            &source(Vec::new()),
            &TransferConfig::default(),
            Arc::new(Account::new("src")),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(MultiCopyError::ZeroSize(_))));
    }

    #[tokio::test]
    async fn test_rejects_unknown_size_source() {
        let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new("mem", MemoryOptions::default()));
        let src: Arc<dyn Object> =
            Arc::new(MemoryObject::detached("src", payload(10), Features::default()).with_unknown_size());
        let result = multi_thread_copy(
            &dst,
            "dst",
            &src,
            &TransferConfig::default(),
            Arc::new(Account::new("src")),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(MultiCopyError::UnknownSize(_))));
    }

    #[tokio::test]
    async fn test_rejects_destination_without_capability() {
        let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new(
            "mem",
            MemoryOptions::default().with_chunk_writer(false).with_writer_at(false),
        ));
        let result = multi_thread_copy(
            &dst,
            "dst",
            &source(payload(10)),
            &TransferConfig::default(),
            Arc::new(Account::new("src")),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(MultiCopyError::CapabilityMissing(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dst: Arc<dyn Fs> = Arc::new(MemoryFs::new("mem", MemoryOptions::default().with_chunk_size(10)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = multi_thread_copy(
            &dst,
            "dst",
            &source(payload(100)),
            &TransferConfig::default(),
            Arc::new(Account::new("src")),
            &cancel,
        )
        .await;

        assert!(matches!(result, Err(MultiCopyError::Cancelled)));
        assert!(dst.new_object("dst").await.is_err());
    }
}
