//! # Audio Streaming
//!
//! Feeds a recorded audio file to the evaluation service as if it were being
//! captured live.
//!
//! ## Key Components:
//! - **Audio Source**: reads the file as opaque bytes in fixed-size chunks
//! - **Audio Streamer**: paces the chunks, sends them as binary frames, then
//!   sends the stop message
//!
//! ## Pacing:
//! The service expects audio at roughly real-time cadence. With pacing on,
//! the streamer waits the configured interval before every chunk.

pub mod source; // Chunked reader over the audio file
pub mod streamer; // Writer task

pub use source::AudioSource;
pub use streamer::{AudioStreamer, StreamSummary};
