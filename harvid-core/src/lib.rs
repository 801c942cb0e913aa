//! Core of the harvid-class frame server: a random-access video decoder, a
//! pool of decoders, a frame cache, and the coordinator tying them
//! together. Everything here is synchronous and thread-based on purpose —
//! callers that need an async boundary (see `harvid-server`) should bridge
//! in with `tokio::task::spawn_blocking`.

pub mod cache;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod pool;
mod process_lock;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod video_info;

pub use coordinator::{Coordinator, Diagnostics, FrameRequest, RenderedFrame};
pub use error::{Error, Result};
pub use video_info::{SeekMode, VideoInfo};

/// Initialises the underlying codec library. Callers must invoke this once
/// before opening any video.
pub fn init() {
    ffmpeg::init().expect("failed to initialize ffmpeg");
}
