//! Error types for MultiCopy
//!
//! This module defines all error types used by the transfer engine and its
//! backends, carrying enough context (chunk index, byte range, object name)
//! to diagnose a failed transfer from a single message.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of a chunk copy at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStage {
    /// Opening the ranged read on the source
    Open,
    /// Reading the range into the chunk buffer
    Read,
    /// Handing the chunk to the destination writer
    Write,
}

impl fmt::Display for ChunkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "failed to open source",
            Self::Read => "failed to read chunk",
            Self::Write => "failed to write chunk",
        };
        f.write_str(s)
    }
}

/// Main error type for MultiCopy operations
#[derive(Error, Debug)]
pub enum MultiCopyError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// File the operation was on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Object does not exist on the backend
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Destination offers neither a chunk writer nor a writer-at
    #[error("multi-thread copy: neither OpenChunkWriter nor OpenWriterAt supported by '{0}'")]
    CapabilityMissing(String),

    /// Source size is not known up front
    #[error("multi-thread copy: can't copy unknown sized file '{0}'")]
    UnknownSize(String),

    /// Source is empty
    #[error("multi-thread copy: can't copy zero sized file '{0}'")]
    ZeroSize(String),

    /// Chunk size reported or configured as zero
    #[error("multi-thread copy: invalid chunk size {0}")]
    InvalidChunkSize(u64),

    /// Destination refused to open a chunk writer
    #[error("multi-thread copy: failed to open chunk writer: {0}")]
    OpenChunkWriter(#[source] Box<MultiCopyError>),

    /// A single chunk failed; carries the chunk index and byte range
    #[error("multi-thread copy: chunk {index} ({start}-{end}): {stage}: {source}")]
    Chunk {
        /// Zero-based chunk index
        index: usize,
        /// First byte of the chunk
        start: u64,
        /// One past the last byte of the chunk
        end: u64,
        /// Step that failed
        stage: ChunkStage,
        /// What went wrong
        #[source]
        source: Box<MultiCopyError>,
    },

    /// Chunk stream delivered a different number of bytes than its range
    #[error("expected to write {expected} bytes for chunk {index}, but wrote {actual} bytes")]
    ChunkSizeMismatch {
        /// Zero-based chunk index
        index: usize,
        /// Length of the chunk's range
        expected: u64,
        /// Bytes actually written
        actual: u64,
    },

    /// Committing the object failed after every chunk succeeded
    #[error("multi-thread copy: failed to close object after copy: {0}")]
    CloseFailed(#[source] Box<MultiCopyError>),

    /// Committed object could not be resolved by name
    #[error("multi-thread copy: failed to find object '{remote}' after copy: {source}")]
    ObjectNotFoundAfterCopy {
        /// Name of the destination object
        remote: String,
        /// Lookup failure
        #[source]
        source: Box<MultiCopyError>,
    },

    /// Backend can't set modification times
    #[error("can't set modified time")]
    CantSetModTime,

    /// Backend can only set modification times by re-uploading
    #[error("can't set modified time without deleting existing object")]
    CantSetModTimeWithoutDelete,

    /// Propagating the modification time failed for another reason
    #[error("multi-thread copy: failed to set modification time: {0}")]
    SetModTime(#[source] Box<MultiCopyError>),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Worker task failed outside of the chunk copy itself (panic, runtime shutdown)
    #[error("Worker task error: {0}")]
    TaskError(String),

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: Box<MultiCopyError>,
    },
}

impl MultiCopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Wrap an error with the chunk it happened in
    pub fn chunk(index: usize, start: u64, end: u64, stage: ChunkStage, source: MultiCopyError) -> Self {
        Self::Chunk {
            index,
            start,
            end,
            stage,
            source: Box::new(source),
        }
    }

    /// Check if this error is a cancellation, possibly wrapped
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Chunk { source, .. } | Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error means the backend can't set modification times
    pub fn is_mod_time_unsupported(&self) -> bool {
        matches!(self, Self::CantSetModTime | Self::CantSetModTimeWithoutDelete)
    }

    /// Index of the chunk this error belongs to, if any
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::Chunk { index, .. } | Self::ChunkSizeMismatch { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Result type alias for MultiCopy operations
pub type Result<T> = std::result::Result<T, MultiCopyError>;

impl From<std::io::Error> for MultiCopyError {
    fn from(err: std::io::Error) -> Self {
        MultiCopyError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for MultiCopyError {
    fn from(err: serde_json::Error) -> Self {
        MultiCopyError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| MultiCopyError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Result<()> = Err(io_err).with_path("/test/path");
        match err.unwrap_err() {
            MultiCopyError::Io { path, .. } => assert_eq!(path, PathBuf::from("/test/path")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_chunk_error_display() {
        let err = MultiCopyError::chunk(
            2,
            128,
            192,
            ChunkStage::Write,
            MultiCopyError::backend("disk on fire"),
        );
        let msg = err.to_string();
        assert!(msg.contains("chunk 2"));
        assert!(msg.contains("128-192"));
        assert!(msg.contains("failed to write chunk"));
        assert_eq!(err.chunk_index(), Some(2));
    }

    #[test]
    fn test_cancellation_detection() {
        assert!(MultiCopyError::Cancelled.is_cancelled());
        let wrapped = MultiCopyError::chunk(0, 0, 10, ChunkStage::Read, MultiCopyError::Cancelled);
        assert!(wrapped.is_cancelled());
        assert!(!MultiCopyError::backend("x").is_cancelled());
    }

    #[test]
    fn test_mod_time_unsupported() {
        assert!(MultiCopyError::CantSetModTime.is_mod_time_unsupported());
        assert!(MultiCopyError::CantSetModTimeWithoutDelete.is_mod_time_unsupported());
        assert!(!MultiCopyError::Cancelled.is_mod_time_unsupported());
    }
}
