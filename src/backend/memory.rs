//! In-memory backend
//!
//! Objects live in a shared map. The backend can be configured to offer a
//! native multipart writer, a random-access writer, or both, which makes it
//! the reference destination for tests and benchmarks.

use crate::backend::{BoxedReader, Features, Fs, Object, RangeOption};
use crate::config::{DEFAULT_MULTI_THREAD_CHUNK_SIZE, DEFAULT_MULTI_THREAD_STREAMS};
use crate::error::{MultiCopyError, Result};
use crate::multipart::{
    ChunkReader, ChunkWriter, ChunkWriterInfo, OpenChunkWriter, OpenWriterAt, WriterAtCloser,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tokio::io::AsyncReadExt;

type Store = Arc<RwLock<HashMap<String, StoredObject>>>;
type Uploads = Arc<Mutex<HashMap<String, BTreeMap<usize, Vec<u8>>>>>;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    mod_time: SystemTime,
}

fn lock_error() -> MultiCopyError {
    MultiCopyError::backend("memory store lock poisoned")
}

/// Capabilities of a [`MemoryFs`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryOptions {
    /// Offer a native multipart writer
    pub chunk_writer: bool,
    /// Offer a random-access writer
    pub writer_at: bool,
    /// Report the storage as local
    pub is_local: bool,
    /// Objects are visible while being written
    pub partial_uploads: bool,
    /// Ask the engine to keep parts on failure
    pub leave_parts_on_error: bool,
    /// Whether objects accept a new modification time
    pub can_set_mod_time: bool,
    /// Chunk size advertised by the native writer
    pub chunk_size: u64,
    /// Concurrency advertised by the native writer
    pub concurrency: usize,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            chunk_writer: true,
            writer_at: false,
            is_local: false,
            partial_uploads: false,
            leave_parts_on_error: false,
            can_set_mod_time: true,
            chunk_size: DEFAULT_MULTI_THREAD_CHUNK_SIZE,
            concurrency: DEFAULT_MULTI_THREAD_STREAMS,
        }
    }
}

impl MemoryOptions {
    /// Enable or disable the native multipart writer
    pub fn with_chunk_writer(mut self, enabled: bool) -> Self {
        self.chunk_writer = enabled;
        self
    }

    /// Enable or disable the random-access writer
    ///
    /// Random-access writes make objects visible before they are complete,
    /// so this also turns on `partial_uploads`.
    pub fn with_writer_at(mut self, enabled: bool) -> Self {
        self.writer_at = enabled;
        self.partial_uploads = enabled;
        self
    }

    /// Report the storage as local
    pub fn with_local(mut self, is_local: bool) -> Self {
        self.is_local = is_local;
        self
    }

    /// Override the partial uploads feature
    pub fn with_partial_uploads(mut self, enabled: bool) -> Self {
        self.partial_uploads = enabled;
        self
    }

    /// Ask the engine to keep parts on failure
    pub fn with_leave_parts_on_error(mut self, leave: bool) -> Self {
        self.leave_parts_on_error = leave;
        self
    }

    /// Whether objects accept a new modification time
    pub fn with_set_mod_time(mut self, enabled: bool) -> Self {
        self.can_set_mod_time = enabled;
        self
    }

    /// Chunk size of the native writer
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Concurrency preference of the native writer
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    fn features(&self) -> Features {
        Features {
            is_local: self.is_local,
            no_multi_threading: false,
            partial_uploads: self.partial_uploads,
        }
    }
}

/// In-memory storage backend
pub struct MemoryFs {
    name: String,
    options: MemoryOptions,
    objects: Store,
    uploads: Uploads,
}

impl MemoryFs {
    /// Create an empty store
    pub fn new(name: impl Into<String>, options: MemoryOptions) -> Self {
        Self {
            name: name.into(),
            options,
            objects: Arc::new(RwLock::new(HashMap::new())),
            uploads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Store `data` as `remote`, replacing any existing object
    pub fn put(&self, remote: &str, data: Vec<u8>) -> Result<Arc<dyn Object>> {
        let size = data.len() as u64;
        let mut objects = self.objects.write().map_err(|_| lock_error())?;
        objects.insert(
            remote.to_string(),
            StoredObject {
                data,
                mod_time: SystemTime::now(),
            },
        );
        Ok(Arc::new(self.object(remote, size)))
    }

    /// Whether `remote` exists
    pub fn contains(&self, remote: &str) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(remote))
            .unwrap_or(false)
    }

    /// Multipart uploads that were started but neither completed nor aborted
    pub fn pending_uploads(&self) -> Vec<String> {
        let mut remotes: Vec<String> = self
            .uploads
            .lock()
            .map(|uploads| uploads.keys().cloned().collect())
            .unwrap_or_default();
        remotes.sort();
        remotes
    }

    fn object(&self, remote: &str, size: u64) -> MemoryObject {
        MemoryObject {
            remote: remote.to_string(),
            size: Some(size),
            features: self.options.features(),
            can_set_mod_time: self.options.can_set_mod_time,
            backing: Backing::Stored(Arc::clone(&self.objects)),
        }
    }
}

#[async_trait]
impl Fs for MemoryFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn features(&self) -> Features {
        self.options.features()
    }

    async fn new_object(&self, remote: &str) -> Result<Arc<dyn Object>> {
        let size = {
            let objects = self.objects.read().map_err(|_| lock_error())?;
            let stored = objects
                .get(remote)
                .ok_or_else(|| MultiCopyError::NotFound(remote.to_string()))?;
            stored.data.len() as u64
        };
        Ok(Arc::new(self.object(remote, size)))
    }

    fn chunk_writer_opener(&self) -> Option<&dyn OpenChunkWriter> {
        if self.options.chunk_writer {
            Some(self)
        } else {
            None
        }
    }

    fn writer_at_opener(&self) -> Option<&dyn OpenWriterAt> {
        if self.options.writer_at {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl OpenChunkWriter for MemoryFs {
    async fn open_chunk_writer(
        &self,
        remote: &str,
        src: &dyn Object,
    ) -> Result<(ChunkWriterInfo, Box<dyn ChunkWriter>)> {
        let size = src
            .size()
            .ok_or_else(|| MultiCopyError::UnknownSize(src.remote().to_string()))?;
        self.uploads
            .lock()
            .map_err(|_| lock_error())?
            .insert(remote.to_string(), BTreeMap::new());
        let writer = MemoryChunkWriter {
            remote: remote.to_string(),
            size,
            mod_time: src.mod_time().await,
            uploads: Arc::clone(&self.uploads),
            objects: Arc::clone(&self.objects),
        };
        let info = ChunkWriterInfo {
            chunk_size: self.options.chunk_size,
            concurrency: self.options.concurrency,
            leave_parts_on_error: self.options.leave_parts_on_error,
        };
        Ok((info, Box::new(writer)))
    }
}

#[async_trait]
impl OpenWriterAt for MemoryFs {
    async fn open_writer_at(&self, remote: &str, size: u64) -> Result<Box<dyn WriterAtCloser>> {
        let mut objects = self.objects.write().map_err(|_| lock_error())?;
        objects.insert(
            remote.to_string(),
            StoredObject {
                data: vec![0; size as usize],
                mod_time: SystemTime::now(),
            },
        );
        Ok(Box::new(MemoryWriterAt {
            remote: remote.to_string(),
            objects: Arc::clone(&self.objects),
        }))
    }
}

/// Native multipart upload into a [`MemoryFs`]
///
/// Parts sit in the store's upload table until `close` assembles them, so
/// no object is visible before then. An upload that is never closed or
/// aborted stays listed in [`MemoryFs::pending_uploads`].
struct MemoryChunkWriter {
    remote: String,
    size: u64,
    mod_time: SystemTime,
    uploads: Uploads,
    objects: Store,
}

impl MemoryChunkWriter {
    fn upload_gone(&self) -> MultiCopyError {
        MultiCopyError::backend(format!("{}: no upload in progress", self.remote))
    }

    fn assemble(&self, parts: &BTreeMap<usize, Vec<u8>>) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size as usize);
        for (expected, (index, part)) in parts.iter().enumerate() {
            if *index != expected {
                return Err(MultiCopyError::backend(format!(
                    "{}: part {} missing from upload",
                    self.remote, expected
                )));
            }
            data.extend_from_slice(part);
        }
        if data.len() as u64 != self.size {
            return Err(MultiCopyError::backend(format!(
                "{}: uploaded {} bytes, expected {}",
                self.remote,
                data.len(),
                self.size
            )));
        }
        Ok(data)
    }
}

#[async_trait]
impl ChunkWriter for MemoryChunkWriter {
    async fn write_chunk(&self, index: usize, reader: &mut ChunkReader) -> Result<u64> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let n = data.len() as u64;
        let mut uploads = self.uploads.lock().map_err(|_| lock_error())?;
        uploads
            .get_mut(&self.remote)
            .ok_or_else(|| self.upload_gone())?
            .insert(index, data);
        Ok(n)
    }

    async fn close(&self) -> Result<()> {
        // A rejected completion leaves the upload in place for abort
        let data = {
            let mut uploads = self.uploads.lock().map_err(|_| lock_error())?;
            let parts = uploads.get(&self.remote).ok_or_else(|| self.upload_gone())?;
            let data = self.assemble(parts)?;
            uploads.remove(&self.remote);
            data
        };

        let mut objects = self.objects.write().map_err(|_| lock_error())?;
        objects.insert(
            self.remote.clone(),
            StoredObject {
                data,
                mod_time: self.mod_time,
            },
        );
        Ok(())
    }

    async fn abort(&self) -> Result<()> {
        self.uploads
            .lock()
            .map_err(|_| lock_error())?
            .remove(&self.remote)
            .map(|_| ())
            .ok_or_else(|| self.upload_gone())
    }
}

/// Random-access writes straight into a stored object
struct MemoryWriterAt {
    remote: String,
    objects: Store,
}

#[async_trait]
impl WriterAtCloser for MemoryWriterAt {
    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let mut objects = self.objects.write().map_err(|_| lock_error())?;
        let stored = objects
            .get_mut(&self.remote)
            .ok_or_else(|| MultiCopyError::NotFound(self.remote.clone()))?;
        let start = offset as usize;
        let end = start + buf.len();
        if end > stored.data.len() {
            stored.data.resize(end, 0);
        }
        stored.data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

enum Backing {
    Detached {
        data: Arc<Vec<u8>>,
        mod_time: Mutex<SystemTime>,
    },
    Stored(Store),
}

/// Object in memory, either in a [`MemoryFs`] or standing alone
pub struct MemoryObject {
    remote: String,
    size: Option<u64>,
    features: Features,
    can_set_mod_time: bool,
    backing: Backing,
}

impl MemoryObject {
    /// An object that belongs to no store, typically a transfer source
    pub fn detached(remote: impl Into<String>, data: Vec<u8>, features: Features) -> Self {
        Self {
            remote: remote.into(),
            size: Some(data.len() as u64),
            features,
            can_set_mod_time: true,
            backing: Backing::Detached {
                data: Arc::new(data),
                mod_time: Mutex::new(SystemTime::now()),
            },
        }
    }

    /// Hide the size, as a streaming source would
    pub fn with_unknown_size(mut self) -> Self {
        self.size = None;
        self
    }

    /// Set the modification time of a detached object
    pub fn with_mod_time(self, time: SystemTime) -> Self {
        if let Backing::Detached { mod_time, .. } = &self.backing {
            if let Ok(mut current) = mod_time.lock() {
                *current = time;
            }
        }
        self
    }

    fn slice(&self, range: Option<RangeOption>) -> Result<Vec<u8>> {
        let read = |data: &[u8]| -> Vec<u8> {
            let (offset, len) = match range {
                Some(range) => range.decode(data.len() as u64),
                None => (0, data.len() as u64),
            };
            data[offset as usize..(offset + len) as usize].to_vec()
        };
        match &self.backing {
            Backing::Detached { data, .. } => Ok(read(data.as_slice())),
            Backing::Stored(objects) => {
                let objects = objects.read().map_err(|_| lock_error())?;
                let stored = objects
                    .get(&self.remote)
                    .ok_or_else(|| MultiCopyError::NotFound(self.remote.clone()))?;
                Ok(read(stored.data.as_slice()))
            }
        }
    }
}

#[async_trait]
impl Object for MemoryObject {
    fn remote(&self) -> &str {
        &self.remote
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn features(&self) -> Features {
        self.features
    }

    async fn mod_time(&self) -> SystemTime {
        match &self.backing {
            Backing::Detached { mod_time, .. } => {
                mod_time.lock().map(|t| *t).unwrap_or(SystemTime::UNIX_EPOCH)
            }
            Backing::Stored(objects) => objects
                .read()
                .ok()
                .and_then(|objects| objects.get(&self.remote).map(|o| o.mod_time))
                .unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    async fn open(&self, range: Option<RangeOption>) -> Result<BoxedReader> {
        let data = self.slice(range)?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn set_mod_time(&self, time: SystemTime) -> Result<()> {
        if !self.can_set_mod_time {
            return Err(MultiCopyError::CantSetModTime);
        }
        match &self.backing {
            Backing::Detached { mod_time, .. } => {
                *mod_time.lock().map_err(|_| lock_error())? = time;
                Ok(())
            }
            Backing::Stored(objects) => {
                let mut objects = objects.write().map_err(|_| lock_error())?;
                let stored = objects
                    .get_mut(&self.remote)
                    .ok_or_else(|| MultiCopyError::NotFound(self.remote.clone()))?;
                stored.mod_time = time;
                Ok(())
            }
        }
    }

    async fn remove(&self) -> Result<()> {
        match &self.backing {
            Backing::Detached { .. } => Ok(()),
            Backing::Stored(objects) => {
                let mut objects = objects.write().map_err(|_| lock_error())?;
                objects
                    .remove(&self.remote)
                    .map(|_| ())
                    .ok_or_else(|| MultiCopyError::NotFound(self.remote.clone()))
            }
        }
    }
}
