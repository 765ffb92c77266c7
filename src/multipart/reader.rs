//! Chunk stream handed to a chunk writer

use crate::accounting::AccountedReader;
use crate::backend::BoxedReader;
use crate::multipart::ChunkBuffer;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf};

/// Bytes of one chunk, either streamed from the source or buffered
///
/// Buffered readers can be rewound; streamed ones cannot. Both count bytes
/// into the transfer's account as they are read.
pub enum ChunkReader {
    /// Straight from the ranged source read
    Stream(AccountedReader<BoxedReader>),
    /// From a fully read chunk buffer
    Buffered(AccountedReader<ChunkBuffer>),
}

impl ChunkReader {
    /// Whether [`ChunkReader::rewind`] is supported
    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Buffered(_))
    }

    /// Go back to the first byte of the chunk
    pub async fn rewind(&mut self) -> io::Result<()> {
        match self {
            Self::Stream(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "chunk reader is not seekable",
            )),
            Self::Buffered(reader) => {
                reader.get_mut().seek(SeekFrom::Start(0)).await?;
                Ok(())
            }
        }
    }
}

impl AsyncRead for ChunkReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Stream(reader) => Pin::new(reader).poll_read(cx, buf),
            Self::Buffered(reader) => Pin::new(reader).poll_read(cx, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::Account;
    use std::io::Cursor;
    use std::sync::Arc;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_stream_reader_cannot_rewind() {
        let account = Arc::new(Account::new("obj"));
        let inner: BoxedReader = Box::new(Cursor::new(vec![1u8, 2, 3]));
        let mut reader = ChunkReader::Stream(account.wrap(inner));
        assert!(!reader.is_seekable());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(reader.rewind().await.unwrap_err().kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_buffered_reader_rewinds() {
        let account = Arc::new(Account::new("obj"));
        let inner: BoxedReader = Box::new(Cursor::new(vec![5u8; 10]));
        let buffer = ChunkBuffer::fill(inner, 10, 1024).await.unwrap();
        let mut reader = ChunkReader::Buffered(account.wrap(buffer));
        assert!(reader.is_seekable());

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        reader.rewind().await.unwrap();
        out.clear();
        reader.read_to_end(&mut out).await.unwrap();

        assert_eq!(out, vec![5u8; 10]);
        // Re-reads are counted, as the bytes really were sent twice
        assert_eq!(account.bytes(), 20);
    }
}
