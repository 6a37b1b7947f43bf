//! The writer task: audio chunks out, then the stop message.

use super::AudioSource;
use crate::error::AppResult;
use crate::session::messages::StopRequest;
use crate::websocket::{SessionSender, WsError};
use futures_util::Sink;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info};

/// What the writer managed to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSummary {
    pub chunks: usize,
    pub bytes: usize,
}

/// Streams one audio source over the sending half of the connection.
pub struct AudioStreamer<R> {
    source: AudioSource<R>,
    pacing: Option<Duration>,
}

impl<R> AudioStreamer<R>
where
    R: AsyncRead + Unpin,
{
    /// `pacing`: delay before each chunk, `None` to send as fast as the
    /// connection allows.
    pub fn new(source: AudioSource<R>, pacing: Option<Duration>) -> Self {
        Self { source, pacing }
    }

    /// Send every chunk as a binary frame, then the stop message.
    ///
    /// ## Failure:
    /// The first read or write failure is logged and returned; nothing more
    /// is sent, not even the stop message. The reader task is not affected.
    pub async fn run<S>(mut self, sender: &mut SessionSender<S>) -> AppResult<StreamSummary>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let mut summary = StreamSummary::default();

        loop {
            let chunk = match self.source.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    error!(chunks = summary.chunks, error = %e, "Audio read failed");
                    return Err(e);
                }
            };

            if let Some(interval) = self.pacing {
                tokio::time::sleep(interval).await;
            }

            let len = chunk.len();
            if let Err(e) = sender.send_binary(chunk).await {
                error!(chunks = summary.chunks, error = %e, "Audio write failed");
                return Err(e);
            }
            summary.chunks += 1;
            summary.bytes += len;
            debug!(chunk = summary.chunks, bytes = len, "Audio chunk sent");
        }

        if let Err(e) = sender.send_structured(&StopRequest::new()).await {
            error!(error = %e, "Stop message write failed");
            return Err(e);
        }

        info!(
            chunks = summary.chunks,
            bytes = summary.bytes,
            "Audio stream finished, stop message sent"
        );
        Ok(summary)
    }
}
