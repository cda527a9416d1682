//! Streaming access to stored artefact bytes.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf, Take};

/// Chunk size for streaming reads and digests.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A reader over one artefact's bytes, bounded to its recorded size.
///
/// The reader owns an open handle on the immutable blob, so the content stays
/// readable even if the identity is overwritten or deleted mid-stream.
#[derive(Debug)]
pub struct ArtefactReader {
    inner: Take<File>,
    size: u64,
}

impl ArtefactReader {
    pub(crate) fn new(file: File, size: u64) -> Self {
        Self {
            inner: file.take(size),
            size,
        }
    }

    /// Recorded size of the artefact.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Convert into a stream of chunks of at most [`CHUNK_SIZE`] bytes.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send {
        chunks(self)
    }

    /// Read the whole artefact into memory.
    pub async fn read_to_vec(mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::try_from(self.size).unwrap_or(0));
        self.read_to_end(&mut out).await?;
        Ok(out)
    }
}

impl AsyncRead for ArtefactReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

/// Adapt any async reader into a stream of [`Bytes`] chunks.
///
/// The stream ends after the first error.
pub fn chunks<R>(reader: R) -> impl Stream<Item = io::Result<Bytes>> + Send
where
    R: AsyncRead + Unpin + Send,
{
    futures::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
        match reader.read_buf(&mut buf).await {
            Ok(0) => None,
            Ok(_) => Some((Ok(buf.freeze()), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn chunks_splits_large_input() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        let collected: Vec<Bytes> = chunks(&data[..]).try_collect().await.unwrap();
        assert!(collected.iter().all(|c| c.len() <= CHUNK_SIZE));
        let total: usize = collected.iter().map(Bytes::len).sum();
        assert_eq!(total, data.len());
    }

    #[tokio::test]
    async fn chunks_of_empty_reader_is_empty() {
        let collected: Vec<Bytes> = chunks(&b""[..]).try_collect().await.unwrap();
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn reader_stops_at_recorded_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"hello world").unwrap();
        let file = File::open(&path).await.unwrap();
        let reader = ArtefactReader::new(file, 5);
        assert_eq!(reader.read_to_vec().await.unwrap(), b"hello");
    }
}
