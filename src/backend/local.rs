//! Local filesystem backend
//!
//! Objects are files under a root directory. The backend has no native
//! multipart upload; it offers random-access writes instead, preallocating
//! the destination and writing each chunk at its offset with positional
//! I/O on a blocking thread.

use crate::backend::{BoxedReader, Features, Fs, Object, RangeOption};
use crate::error::{IoResultExt, MultiCopyError, Result};
use crate::multipart::{OpenWriterAt, WriterAtCloser};
use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const LOCAL_FEATURES: Features = Features {
    is_local: true,
    no_multi_threading: false,
    partial_uploads: true,
};

fn join_error(e: tokio::task::JoinError) -> MultiCopyError {
    MultiCopyError::TaskError(e.to_string())
}

/// Files under a root directory
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    name: String,
}

impl LocalFs {
    /// Serve files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let name = format!("local:{}", root.display());
        Self { root, name }
    }

    /// Absolute path of `remote`
    pub fn path(&self, remote: &str) -> PathBuf {
        self.root.join(remote)
    }
}

#[async_trait]
impl Fs for LocalFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn features(&self) -> Features {
        LOCAL_FEATURES
    }

    async fn new_object(&self, remote: &str) -> Result<Arc<dyn Object>> {
        let path = self.path(remote);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MultiCopyError::NotFound(remote.to_string()));
            }
            Err(e) => return Err(MultiCopyError::io(path, e)),
        };
        if !metadata.is_file() {
            return Err(MultiCopyError::NotFound(remote.to_string()));
        }
        let mod_time = metadata.modified().with_path(&path)?;
        Ok(Arc::new(LocalObject {
            remote: remote.to_string(),
            path,
            size: metadata.len(),
            mod_time,
        }))
    }

    fn writer_at_opener(&self) -> Option<&dyn OpenWriterAt> {
        Some(self)
    }
}

#[async_trait]
impl OpenWriterAt for LocalFs {
    async fn open_writer_at(&self, remote: &str, size: u64) -> Result<Box<dyn WriterAtCloser>> {
        let path = self.path(remote);
        let file = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || -> Result<std::fs::File> {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_path(parent)?;
                }
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)
                    .with_path(&path)?;
                // Preallocate so chunks can land anywhere
                file.set_len(size).with_path(&path)?;
                Ok(file)
            })
            .await
            .map_err(join_error)??
        };
        Ok(Box::new(LocalWriterAt {
            path,
            file: Mutex::new(Some(Arc::new(file))),
        }))
    }
}

/// Positional writer over an open local file
struct LocalWriterAt {
    path: PathBuf,
    file: Mutex<Option<Arc<std::fs::File>>>,
}

impl LocalWriterAt {
    fn handle(&self) -> Result<Option<Arc<std::fs::File>>> {
        let guard = self
            .file
            .lock()
            .map_err(|_| MultiCopyError::backend("local writer lock poisoned"))?;
        Ok(guard.clone())
    }
}

#[cfg(unix)]
fn write_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

#[async_trait]
impl WriterAtCloser for LocalWriterAt {
    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let file = self.handle()?.ok_or_else(|| {
            MultiCopyError::backend(format!("{}: write after close", self.path.display()))
        })?;
        let data = buf.to_vec();
        tokio::task::spawn_blocking(move || write_at(&file, &data, offset))
            .await
            .map_err(join_error)?
            .with_path(&self.path)
    }

    async fn close(&self) -> Result<()> {
        let file = {
            let mut guard = self
                .file
                .lock()
                .map_err(|_| MultiCopyError::backend("local writer lock poisoned"))?;
            guard.take()
        };
        let Some(file) = file else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(join_error)?
            .with_path(&self.path)
    }
}

/// A file below a [`LocalFs`] root
pub struct LocalObject {
    remote: String,
    path: PathBuf,
    size: u64,
    mod_time: SystemTime,
}

#[async_trait]
impl Object for LocalObject {
    fn remote(&self) -> &str {
        &self.remote
    }

    fn size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn features(&self) -> Features {
        LOCAL_FEATURES
    }

    async fn mod_time(&self) -> SystemTime {
        self.mod_time
    }

    async fn open(&self, range: Option<RangeOption>) -> Result<BoxedReader> {
        let mut file = tokio::fs::File::open(&self.path).await.with_path(&self.path)?;
        match range {
            None => Ok(Box::new(file)),
            Some(range) => {
                let (offset, len) = range.decode(self.size);
                file.seek(SeekFrom::Start(offset)).await.with_path(&self.path)?;
                Ok(Box::new(file.take(len)))
            }
        }
    }

    async fn set_mod_time(&self, time: SystemTime) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(time))
        })
        .await
        .map_err(join_error)?
        .with_path(&self.path)
    }

    async fn remove(&self) -> Result<()> {
        tokio::fs::remove_file(&self.path).await.with_path(&self.path)
    }
}
