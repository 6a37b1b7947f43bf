//! Chunked reader over the audio file.
//!
//! The bytes are never decoded: the service receives the file exactly as it
//! is stored, header included.

use crate::error::{AppError, AppResult};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Yields the source in chunks of exactly `chunk_size` bytes; only the last
/// chunk may be shorter. Short reads from the OS are coalesced, so a source
/// of `L` bytes always yields `ceil(L / chunk_size)` chunks.
pub struct AudioSource<R> {
    reader: R,
    chunk_size: usize,
    exhausted: bool,
}

impl AudioSource<File> {
    /// Open an audio file.
    ///
    /// Called before any network activity so that a missing file fails the
    /// run before a token is spent.
    pub async fn open(path: &str, chunk_size: usize) -> AppResult<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| AppError::AudioSource(format!("opening {}: {}", path, e)))?;

        if let Ok(metadata) = file.metadata().await {
            debug!(path = %path, bytes = metadata.len(), chunk_size, "Audio source opened");
        }
        Ok(Self::new(file, chunk_size))
    }
}

impl<R> AudioSource<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size,
            exhausted: false,
        }
    }

    /// Read the next chunk, or `None` once the source is exhausted.
    pub async fn next_chunk(&mut self) -> AppResult<Option<Vec<u8>>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self
                .reader
                .read(&mut chunk[filled..])
                .await
                .map_err(|e| AppError::AudioSource(format!("reading audio: {}", e)))?;
            if n == 0 {
                self.exhausted = true;
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        chunk.truncate(filled);
        Ok(Some(chunk))
    }
}
